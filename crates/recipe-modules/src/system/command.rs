// Turning `run` parameters into a launchable command.

use crate::error::ValidationError;
use crate::parameters::{ParameterBag, ParameterContract, Value};
use recipe_sdk::CommandLine;
use std::path::PathBuf;
use std::time::Duration;

/// Timeout applied when the step does not pass one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const RUN_PARAMETER_NAMES: [&str; 3] = ["command", "timeout", "cwd"];

/// A validated `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: CommandLine,
    pub working_directory: Option<PathBuf>,
    /// `None` means wait without bound.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Build a command from the step parameters.
    ///
    /// A single parameter may be the bare command, by name or at position 0.
    /// Several parameters must all be named, out of `command`, `timeout` and
    /// `cwd`.
    pub fn from_parameters(parameters: &ParameterBag) -> Result<Self, ValidationError> {
        ParameterContract::between(1, 3).validate(parameters)?;

        if parameters.len() > 1 {
            let unexpected = parameters.keys().find(|key| {
                !key
                    .as_name()
                    .is_some_and(|name| RUN_PARAMETER_NAMES.contains(&name))
            });
            if let Some(key) = unexpected {
                return Err(ValidationError::InvalidArgument(format!(
                    "Unexpected parameter name \"{key}\"."
                )));
            }
        }

        Ok(Self {
            program: parse_program(parameters.get_name_or_position("command", 0))?,
            working_directory: parse_working_directory(parameters.get_named("cwd"))?,
            timeout: parse_timeout(parameters.get_named("timeout"))?,
        })
    }
}

fn invalid_command() -> ValidationError {
    ValidationError::InvalidArgument("Invalid command. Expected string or array value.".into())
}

fn parse_program(value: Option<&Value>) -> Result<CommandLine, ValidationError> {
    match value {
        Some(Value::String(line)) if !line.trim().is_empty() => Ok(CommandLine::Shell(line.clone())),
        Some(Value::List(tokens)) => {
            if tokens.is_empty() {
                return Err(ValidationError::InvalidArgument(
                    "Invalid command. The argument list is empty.".into(),
                ));
            }
            tokens
                .iter()
                .enumerate()
                .map(|(index, token)| match token {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(ValidationError::InvalidArgument(format!(
                        "Invalid command. Argument {index} must be a string, found {}.",
                        other.kind()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(CommandLine::Argv)
        }
        _ => Err(invalid_command()),
    }
}

fn parse_working_directory(value: Option<&Value>) -> Result<Option<PathBuf>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(dir)) => Ok(Some(PathBuf::from(dir))),
        Some(other) => Err(ValidationError::InvalidArgument(format!(
            "Invalid working directory. Expected string value. Found {}.",
            other.kind()
        ))),
    }
}

/// Absent means the default; an explicit `null` or `0` means no limit.
fn parse_timeout(value: Option<&Value>) -> Result<Option<Duration>, ValidationError> {
    match value {
        None => Ok(Some(DEFAULT_TIMEOUT)),
        Some(Value::Null) | Some(Value::Int(0)) => Ok(None),
        Some(Value::Int(secs)) if *secs > 0 => Ok(Some(Duration::from_secs(secs.unsigned_abs()))),
        Some(other) => Err(ValidationError::InvalidArgument(format!(
            "Invalid timeout value. Value found: {other}."
        ))),
    }
}

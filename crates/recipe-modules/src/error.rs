use crate::parameters::{ArityBounds, ExpectedType, ParameterKey, ValueKind};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A recipe-author error detected before any side effect. Aborts the step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{expected}. Found {actual}.")]
    Arity { expected: ArityBounds, actual: usize },

    #[error("Parameter \"{key}\" is not recognized.")]
    UnrecognizedParameter { key: ParameterKey },

    #[error("{}", .problem.message(.parameter))]
    EmptyOrNonString {
        parameter: ParameterKey,
        problem: StringProblem,
    },

    #[error("Parameter \"{parameter}\" is expected as {expected}. Found {found}.")]
    Type {
        parameter: ParameterKey,
        expected: ExpectedType,
        found: ValueKind,
    },

    #[error("{0}")]
    InvalidArgument(String),
}

/// Why a parameter failed a non-empty string check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringProblem {
    Missing,
    NotAString(ValueKind),
    Blank,
}

impl StringProblem {
    fn message(&self, parameter: &ParameterKey) -> String {
        match self {
            StringProblem::Missing => {
                format!("Expected a string as parameter \"{parameter}\". Found nothing.")
            }
            StringProblem::NotAString(kind) => {
                format!("Expected a string as parameter \"{parameter}\". Found {kind}.")
            }
            StringProblem::Blank => {
                format!("Parameter \"{parameter}\" cannot be white space or empty.")
            }
        }
    }
}

/// Errors surfaced by method dispatch.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Method \"{method}\" is not provided by module \"{module}\".")]
    MethodNotFound { module: String, method: String },

    #[error("No registered module provides the operation \"{0}\".")]
    UnknownOperation(String),

    #[error("Operation \"{method}\" is provided by both \"{first}\" and \"{second}\".")]
    DuplicateMethod {
        method: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A runtime failure of the underlying primitive.
///
/// Never propagated to the caller of a handler: it is traced and turned into
/// `success=false`.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("{operation} failed")]
    FileSystem {
        operation: &'static str,
        #[source]
        cause: anyhow::Error,
    },

    #[error("the process could not be started")]
    Spawn {
        #[source]
        cause: anyhow::Error,
    },

    #[error("the process exited with code {0}")]
    ExitCode(i32),

    #[error("the process was terminated by a signal")]
    Signalled,

    #[error("the process exceeded its timeout of {}s and was terminated", .0.as_secs())]
    TimedOut(Duration),

    #[error("the process was cancelled")]
    Cancelled,

    #[error("transfer from \"{url}\" failed")]
    Transport {
        url: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("\"{url}\" answered with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("could not write \"{}\"", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        cause: anyhow::Error,
    },
}

impl OperationError {
    /// The error and its causes on one line, for trace output.
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = std::error::Error::source(cause);
        }
        message
    }
}

// recipe-module-host: Runs a single recipe step operation from the command line.
//
// The parameter document (JSON or YAML) is read from a file or stdin and turned
// into a `ParameterBag`. A mapping gives named parameters in document order
// (all-digit keys are positions), a sequence gives positional ones and a lone
// scalar is position 0.

use anyhow::{Context, Result};
use clap::ValueEnum;
use recipe_modules::{ExecutionResult, ParameterBag, ParameterKey, Value};
use std::io::Read;
use std::path::Path;

/// Process exit codes.
pub mod exit_code {
    /// The operation ran and reported success.
    pub const SUCCESS: u8 = 0;
    /// The operation ran and reported failure.
    pub const OPERATION_FAILED: u8 = 1;
    /// Invalid parameters, unknown operation or unreadable input.
    pub const FATAL: u8 = 2;
}

/// Syntax of the parameter document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

/// Read the parameter document from `path`, or from stdin when `None`.
pub fn read_document(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read parameters from '{}'", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read parameters from stdin")?;
            Ok(text)
        }
    }
}

/// Parse a parameter document. Blank input is an empty bag.
pub fn parse_parameters(text: &str, format: DocumentFormat) -> Result<ParameterBag> {
    if text.trim().is_empty() {
        return Ok(ParameterBag::new());
    }

    let document: serde_json::Value = match format {
        DocumentFormat::Json => {
            serde_json::from_str(text).context("Parameter document is not valid JSON")?
        }
        DocumentFormat::Yaml => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(text).context("Parameter document is not valid YAML")?;
            serde_json::to_value(yaml).context("Parameter document uses unsupported YAML")?
        }
    };

    match document {
        serde_json::Value::Null => Ok(ParameterBag::new()),
        serde_json::Value::Object(entries) => {
            let mut bag = ParameterBag::new();
            for (key, value) in entries {
                let value = to_parameter_value(&key, value)?;
                bag.insert(parse_key(&key), value);
            }
            Ok(bag)
        }
        serde_json::Value::Array(items) => {
            let mut bag = ParameterBag::new();
            for (position, item) in items.into_iter().enumerate() {
                bag.insert(position, to_parameter_value(&position.to_string(), item)?);
            }
            Ok(bag)
        }
        scalar => Ok(ParameterBag::new().with(0usize, to_parameter_value("0", scalar)?)),
    }
}

fn parse_key(key: &str) -> ParameterKey {
    match key.parse::<usize>() {
        Ok(position) if key.bytes().all(|b| b.is_ascii_digit()) => ParameterKey::Position(position),
        _ => ParameterKey::Name(key.to_string()),
    }
}

fn to_parameter_value(key: &str, value: serde_json::Value) -> Result<Value> {
    serde_json::from_value(value)
        .with_context(|| format!("Parameter \"{key}\" must be a scalar or a list of scalars"))
}

/// Exit code for a finished operation.
pub fn exit_code_for(result: &ExecutionResult) -> u8 {
    if result.is_success() {
        exit_code::SUCCESS
    } else {
        exit_code::OPERATION_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_mapping_gives_named_parameters() {
        let bag = parse_parameters(
            r#"{"command": ["echo", "hi"], "timeout": 10, "cwd": null}"#,
            DocumentFormat::Json,
        )
        .unwrap();
        assert_eq!(bag.len(), 3);
        assert_eq!(
            bag.get_named("command"),
            Some(&Value::from(vec!["echo", "hi"]))
        );
        assert_eq!(bag.get_named("timeout"), Some(&Value::Int(10)));
        assert_eq!(bag.get_named("cwd"), Some(&Value::Null));
    }

    #[test]
    fn mapping_keys_keep_document_order() {
        let bag = parse_parameters(
            r#"{"command": "ls", "zzz": 1, "aaa": 2}"#,
            DocumentFormat::Json,
        )
        .unwrap();
        let keys: Vec<String> = bag.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["command", "zzz", "aaa"]);

        let bag = parse_parameters("timeout: 5
command: ls
", DocumentFormat::Yaml).unwrap();
        let keys: Vec<String> = bag.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["timeout", "command"]);
    }

    #[test]
    fn yaml_sequence_gives_positions() {
        let bag = parse_parameters("- file1\n- dir1\n", DocumentFormat::Yaml).unwrap();
        assert_eq!(bag.get(&ParameterKey::Position(0)), Some(&Value::from("file1")));
        assert_eq!(bag.get(&ParameterKey::Position(1)), Some(&Value::from("dir1")));
    }

    #[test]
    fn scalar_is_position_zero() {
        let bag = parse_parameters("echo hi", DocumentFormat::Yaml).unwrap();
        assert_eq!(bag, ParameterBag::new().with(0usize, "echo hi"));

        let bag = parse_parameters(r#""echo hi""#, DocumentFormat::Json).unwrap();
        assert_eq!(bag, ParameterBag::new().with(0usize, "echo hi"));
    }

    #[test]
    fn digit_keys_are_positions() {
        let bag = parse_parameters("0: /tmp/dir\n", DocumentFormat::Yaml).unwrap();
        assert_eq!(bag.get(&ParameterKey::Position(0)), Some(&Value::from("/tmp/dir")));

        let bag = parse_parameters(r#"{"+1": "x"}"#, DocumentFormat::Json).unwrap();
        assert_eq!(bag.get_named("+1"), Some(&Value::from("x")));
    }

    #[test]
    fn blank_document_is_empty() {
        assert!(parse_parameters("  \n", DocumentFormat::Json).unwrap().is_empty());
        assert!(parse_parameters("~", DocumentFormat::Yaml).unwrap().is_empty());
    }

    #[test]
    fn nested_mappings_are_rejected() {
        let err = parse_parameters(r#"{"command": {"a": 1}}"#, DocumentFormat::Json).unwrap_err();
        assert!(err.to_string().contains("\"command\""));
    }

    #[test]
    fn malformed_documents() {
        assert!(parse_parameters("{", DocumentFormat::Json).is_err());
        assert!(parse_parameters("a: [", DocumentFormat::Yaml).is_err());
    }

    #[test]
    fn read_document_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, "[1]").unwrap();
        assert_eq!(read_document(Some(&path)).unwrap(), "[1]");
        assert!(read_document(Some(&dir.path().join("missing"))).is_err());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(
            exit_code_for(&ExecutionResult::new(json!({}), true)),
            exit_code::SUCCESS
        );
        assert_eq!(
            exit_code_for(&ExecutionResult::empty(false)),
            exit_code::OPERATION_FAILED
        );
    }
}

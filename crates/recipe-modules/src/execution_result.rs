use serde::{Deserialize, Serialize};
use serde_json::json;

/// The outcome of one handler invocation: a success flag plus a JSON payload.
///
/// Built once at the end of a handler and handed to the caller as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    success: bool,
    payload: serde_json::Value,
}

impl ExecutionResult {
    pub fn new(payload: serde_json::Value, success: bool) -> Self {
        Self { success, payload }
    }

    /// A result whose payload is the empty object `{}`.
    pub fn empty(success: bool) -> Self {
        Self::new(json!({}), success)
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// The payload serialized as a compact JSON document.
    pub fn json_result(&self) -> String {
        self.payload.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_an_object() {
        let result = ExecutionResult::empty(true);
        assert!(result.is_success());
        assert_eq!(result.json_result(), "{}");
    }

    #[test]
    fn serializes_flag_and_payload() {
        let result = ExecutionResult::new(json!({"content": null}), false);
        let text = serde_json::to_string(&result).unwrap();
        assert_eq!(text, r#"{"success":false,"payload":{"content":null}}"#);

        let back: ExecutionResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, result);
    }
}

//! The sanitized projection of a fetch outcome.
//!
//! This is the only representation of a Credential Phase result allowed to
//! cross into the Global Phase, into interpolation, or into logs. On success
//! it retains exactly the response body; status codes, response headers, and
//! upstream error detail are discarded at construction and cannot be
//! recovered.

use std::fmt;

use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::ExecError;
use crate::runner::{RawFetchError, RawOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum SanitizedResult {
    /// `{"success": true, "data": <body>}`
    Success { data: Value },
    /// `{"error": true, "message": ..., "type": ...}`
    Error { message: String, kind: String },
}

impl SanitizedResult {
    pub fn success(data: Value) -> Self {
        SanitizedResult::Success { data }
    }

    pub fn error(message: impl Into<String>, kind: impl Into<String>) -> Self {
        SanitizedResult::Error {
            message: message.into(),
            kind: kind.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SanitizedResult::Success { .. })
    }

    /// The response body, if this is a success.
    pub fn data(&self) -> Option<&Value> {
        match self {
            SanitizedResult::Success { data } => Some(data),
            SanitizedResult::Error { .. } => None,
        }
    }

    /// Project an execution error onto the sanitized error shape.
    ///
    /// Subprocess failures and timeouts fold into `execution_error`: from the
    /// caller's side of the boundary there is no meaningful difference, and
    /// finer detail would leak how the fetch failed.
    pub fn from_exec_error(err: &ExecError) -> Self {
        let kind = match err {
            ExecError::Spawn(_) | ExecError::Timeout(_) | ExecError::Execution { .. } => {
                "execution_error"
            }
            other => other.kind(),
        };
        let message = match err {
            ExecError::Execution { exit_code, .. } => {
                format!("subprocess exited with code {}", exit_code)
            }
            other => other.to_string(),
        };
        SanitizedResult::Error {
            message,
            kind: kind.to_string(),
        }
    }
}

impl Serialize for SanitizedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SanitizedResult::Success { data } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("data", data)?;
                map.end()
            }
            SanitizedResult::Error { message, kind } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("error", &true)?;
                map.serialize_entry("message", message)?;
                map.serialize_entry("type", kind)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for SanitizedResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.get("error").and_then(Value::as_bool) == Some(true) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let kind = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("execution_error")
                .to_string();
            return Ok(SanitizedResult::Error { message, kind });
        }
        if value.get("success").and_then(Value::as_bool) == Some(true) {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            return Ok(SanitizedResult::Success { data });
        }
        Err(D::Error::custom("neither a success nor an error result"))
    }
}

impl fmt::Display for SanitizedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanitizedResult::Success { .. } => f.write_str("success"),
            SanitizedResult::Error { kind, .. } => write!(f, "error({})", kind),
        }
    }
}

/// Reduce a raw fetch outcome to its sanitized projection.
///
/// The raw outcome is consumed: nothing upstream of this call retains it.
pub fn sanitize_outcome(outcome: RawOutcome, max_body_bytes: usize) -> SanitizedResult {
    match outcome {
        RawOutcome::Success(raw) => {
            let body_len = raw.body.to_string().len();
            if body_len > max_body_bytes {
                return SanitizedResult::error(
                    format!(
                        "response body of {} bytes exceeds the {} byte limit",
                        body_len, max_body_bytes
                    ),
                    "sanitization_error",
                );
            }
            SanitizedResult::Success { data: raw.body }
        }
        RawOutcome::Error(RawFetchError { message, .. }) => {
            // upstream detail stops here; first line, bounded length
            let message = message.lines().next().unwrap_or("fetch failed");
            let message: String = message.chars().take(300).collect();
            SanitizedResult::error(message, "execution_error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RawResult;
    use serde_json::json;
    use std::collections::HashMap;

    fn raw_success(body: Value) -> RawOutcome {
        RawOutcome::Success(RawResult {
            status: 200,
            headers: HashMap::from([("x-request-token".to_string(), "tok-9f8e7d".to_string())]),
            body,
        })
    }

    #[test]
    fn test_success_wire_shape() {
        let result = SanitizedResult::success(json!({"id": 42}));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value, json!({"success": true, "data": {"id": 42}}));
    }

    #[test]
    fn test_error_wire_shape() {
        let result = SanitizedResult::error("fetch failed", "execution_error");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"error": true, "message": "fetch failed", "type": "execution_error"})
        );
    }

    #[test]
    fn test_wire_roundtrip() {
        for result in [
            SanitizedResult::success(json!([1, 2, 3])),
            SanitizedResult::error("boom", "parse_error"),
        ] {
            let json = serde_json::to_string(&result).unwrap();
            let back: SanitizedResult = serde_json::from_str(&json).unwrap();
            assert_eq!(back, result);
        }
    }

    #[test]
    fn test_sanitize_retains_only_the_body() {
        let sanitized = sanitize_outcome(raw_success(json!({"id": 42})), 1024);
        let value = serde_json::to_value(&sanitized).unwrap();
        let rendered = value.to_string();
        assert!(!rendered.contains("tok-9f8e7d"));
        assert!(!rendered.contains("headers"));
        assert!(!rendered.contains("status"));
        assert_eq!(sanitized.data(), Some(&json!({"id": 42})));
    }

    #[test]
    fn test_oversized_body_becomes_sanitization_error() {
        let big = json!("x".repeat(2048));
        let sanitized = sanitize_outcome(raw_success(big), 1024);
        match sanitized {
            SanitizedResult::Error { kind, .. } => assert_eq!(kind, "sanitization_error"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_error_keeps_first_line_only() {
        let outcome = RawOutcome::Error(RawFetchError {
            message: "connect refused\nat Socket.connect (net.js:42)\nat stack frame".into(),
            kind: "fetch_error".into(),
        });
        let sanitized = sanitize_outcome(outcome, 1024);
        match sanitized {
            SanitizedResult::Error { message, kind } => {
                assert_eq!(message, "connect refused");
                assert_eq!(kind, "execution_error");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_maps_to_execution_error() {
        let sanitized = SanitizedResult::from_exec_error(&ExecError::Timeout(30));
        match sanitized {
            SanitizedResult::Error { kind, .. } => assert_eq!(kind, "execution_error"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_keeps_its_kind() {
        let err = ExecError::RateLimit {
            variable: "a".into(),
            max: 10,
            window_secs: 60,
        };
        let sanitized = SanitizedResult::from_exec_error(&err);
        match sanitized {
            SanitizedResult::Error { kind, .. } => assert_eq!(kind, "rate_limit_error"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_execution_error_message_has_no_stderr() {
        let err = ExecError::Execution {
            exit_code: 1,
            stdout: String::new(),
            stderr: "Authorization: Bearer super-secret".into(),
        };
        let sanitized = SanitizedResult::from_exec_error(&err);
        match sanitized {
            SanitizedResult::Error { message, .. } => {
                assert!(!message.contains("super-secret"));
                assert!(message.contains("exited with code 1"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

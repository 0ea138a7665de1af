//! The inter-process result protocol.
//!
//! A spawned script reports its result as exactly one stdout line of the
//! shape `<SENTINEL>: <json>`. The parent scans the full captured stdout for
//! the last occurrence of the sentinel; anything else on stdout is free-form
//! output. A missing sentinel is a parse error, never a crash.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecError;

/// Sentinel for Credential Phase fetch results.
pub const SECURE_FETCH_SENTINEL: &str = "SECURE_FETCH_RESULT";
/// Sentinel for Global Phase results.
pub const GLOBAL_EXEC_SENTINEL: &str = "GLOBAL_EXEC_RESULT";

/// Extract and parse the payload of the last sentinel line in `stdout`.
pub fn extract_sentinel_payload(stdout: &str, sentinel: &str) -> Result<Value, ExecError> {
    let marker = format!("{}: ", sentinel);
    let payload = stdout
        .lines()
        .rev()
        .find_map(|line| line.find(&marker).map(|at| &line[at + marker.len()..]))
        .ok_or_else(|| ExecError::Parse(format!("no {} line in subprocess output", sentinel)))?;
    serde_json::from_str(payload)
        .map_err(|e| ExecError::Parse(format!("malformed {} payload: {}", sentinel, e)))
}

/// The unsanitized outcome of one fetch, as reported by the child.
///
/// Deliberately not `Serialize`: a raw result exists only between sentinel
/// parsing and sanitization, and must never be persisted or logged. `Debug`
/// elides everything that could carry credential material.
pub struct RawResult {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl fmt::Debug for RawResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResult")
            .field("status", &self.status)
            .field("headers", &format_args!("<{} elided>", self.headers.len()))
            .field("body", &format_args!("<elided>"))
            .finish()
    }
}

/// Error descriptor reported by the child in place of a result.
#[derive(Debug, Clone)]
pub struct RawFetchError {
    pub message: String,
    pub kind: String,
}

/// A parsed Credential Phase sentinel payload.
#[derive(Debug)]
pub enum RawOutcome {
    Success(RawResult),
    Error(RawFetchError),
}

impl RawOutcome {
    /// Interpret a sentinel payload. Shapes that are neither a result nor an
    /// error descriptor are a parse error.
    pub fn from_value(value: Value) -> Result<Self, ExecError> {
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown fetch error")
                .to_string();
            let kind = err
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("fetch_error")
                .to_string();
            return Ok(RawOutcome::Error(RawFetchError { message, kind }));
        }

        let status = value
            .get("status")
            .and_then(Value::as_u64)
            .ok_or_else(|| ExecError::Parse("fetch result is missing 'status'".into()))?
            as u16;
        let headers = value
            .get("headers")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let body = value.get("body").cloned().unwrap_or(Value::Null);
        Ok(RawOutcome::Success(RawResult {
            status,
            headers,
            body,
        }))
    }
}

/// The Global Phase result payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOutcome {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, rename = "returnValue")]
    pub return_value: Value,
    #[serde(default)]
    pub errors: Vec<String>,
}

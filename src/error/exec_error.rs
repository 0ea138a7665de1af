use thiserror::Error;

/// Errors raised while executing a request (either phase, or the legacy paths).
///
/// Every variant carries a stable wire tag, returned by [`ExecError::kind`],
/// that callers and persisted job records use to classify failures without
/// parsing display strings.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Rate limit exceeded for '{variable}': {max} requests per {window_secs}s window")]
    RateLimit {
        variable: String,
        max: usize,
        window_secs: u64,
    },
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },
    #[error("Security violation: {0}")]
    SecurityViolation(String),
    #[error("Spawn error: {0}")]
    Spawn(String),
    #[error("Subprocess exceeded {0}s timeout")]
    Timeout(u64),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Subprocess exited with code {exit_code}")]
    Execution {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("Sanitization error: {0}")]
    Sanitization(String),
}

impl ExecError {
    /// Stable machine-readable tag for this error.
    ///
    /// Spawn failures and timeouts keep distinct tags so the subprocess
    /// runner's callers can tell them apart; the per-variable sanitized
    /// projection folds both into `execution_error` (see
    /// `SanitizedResult::from_exec_error`).
    pub fn kind(&self) -> &'static str {
        match self {
            ExecError::Validation(_) => "validation_error",
            ExecError::RateLimit { .. } => "rate_limit_error",
            ExecError::DependencyCycle { .. } => "dependency_cycle_error",
            ExecError::SecurityViolation(_) => "security_violation",
            ExecError::Spawn(_) => "spawn_error",
            ExecError::Timeout(_) => "timeout_error",
            ExecError::Parse(_) => "parse_error",
            ExecError::Execution { .. } => "execution_error",
            ExecError::Sanitization(_) => "sanitization_error",
        }
    }

    /// Whether this error aborts a request before any subprocess is spawned.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            ExecError::Validation(_)
                | ExecError::DependencyCycle { .. }
                | ExecError::SecurityViolation(_)
        )
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(e: serde_json::Error) -> Self {
        ExecError::Parse(e.to_string())
    }
}

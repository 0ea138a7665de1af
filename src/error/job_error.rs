use thiserror::Error;

use super::ExecError;

/// Scheduler-level errors.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Job store error: {0}")]
    Store(String),
    #[error("Invalid job state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        JobError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(e: serde_json::Error) -> Self {
        JobError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_display() {
        assert_eq!(
            JobError::NotFound("j1".into()).to_string(),
            "Job not found: j1"
        );
        assert_eq!(
            JobError::Store("disk full".into()).to_string(),
            "Job store error: disk full"
        );
    }

    #[test]
    fn test_exec_error_passthrough() {
        let err: JobError = ExecError::Timeout(5).into();
        assert!(err.to_string().contains("5s timeout"));
        match err {
            JobError::Exec(inner) => assert_eq!(inner.kind(), "timeout_error"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

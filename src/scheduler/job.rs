//! The job model.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::ExecutionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Taxonomy-tagged failure recorded on a FAILED job. Captured output, when
/// present, has already been through the secret redactor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// A scheduled, persisted unit of execution work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub request: ExecutionRequest,
    /// Monotonic admission sequence; pending jobs are admitted in this order.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl Job {
    pub fn new(request: ExecutionRequest, seq: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            request,
            seq,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            progress: 0,
            progress_message: None,
            result: None,
            error: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

static PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Progress:\s*(-?\d+)%\s*(.*)$").unwrap());

/// Parse one stdout line against the `Progress: NN%` convention.
/// Out-of-range values clamp to [0, 100].
pub fn parse_progress_line(line: &str) -> Option<(u8, Option<String>)> {
    let caps = PROGRESS_RE.captures(line.trim())?;
    let raw: i64 = caps[1].parse().ok()?;
    let progress = raw.clamp(0, 100) as u8;
    let message = caps[2].trim();
    let message = if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    };
    Some((progress, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line_basic() {
        assert_eq!(parse_progress_line("Progress: 40%"), Some((40, None)));
        assert_eq!(
            parse_progress_line("Progress: 75% fetching orders"),
            Some((75, Some("fetching orders".to_string())))
        );
    }

    #[test]
    fn test_progress_line_clamps() {
        assert_eq!(parse_progress_line("Progress: 150%"), Some((100, None)));
        assert_eq!(parse_progress_line("Progress: -20%"), Some((0, None)));
    }

    #[test]
    fn test_non_progress_lines_ignored() {
        assert_eq!(parse_progress_line("fetching orders"), None);
        assert_eq!(parse_progress_line("progress soon"), None);
        assert_eq!(parse_progress_line("Progress: soon%"), None);
    }

    #[test]
    fn test_job_ids_are_opaque_and_distinct() {
        let a = Job::new(ExecutionRequest::default(), 0);
        let b = Job::new(ExecutionRequest::default(), 1);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 36);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(JobStatus::Pending).unwrap(),
            serde_json::json!("PENDING")
        );
        assert_eq!(
            serde_json::from_value::<JobStatus>(serde_json::json!("CANCELLED")).unwrap(),
            JobStatus::Cancelled
        );
    }

    #[test]
    fn test_job_serde_roundtrip() {
        let mut job = Job::new(ExecutionRequest::default(), 3);
        job.status = JobStatus::Failed;
        job.error = Some(JobFailure {
            kind: "execution_error".into(),
            message: "subprocess exited with code 1".into(),
            stdout: None,
            stderr: Some("boom".into()),
        });
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.status, JobStatus::Failed);
        assert_eq!(back.seq, 3);
        assert_eq!(back.error.unwrap().kind, "execution_error");
    }
}

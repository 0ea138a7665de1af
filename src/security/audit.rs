use async_trait::async_trait;
use serde::Serialize;

/// A security-relevant decision made while handling a request.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub timestamp: i64,
    pub job_id: Option<String>,
    pub event_type: SecurityEventType,
    pub severity: EventSeverity,
}

#[derive(Debug, Clone, Serialize)]
pub enum SecurityEventType {
    /// The static scan found a credential-class reference in global code.
    CredentialReferenceBlocked { tokens: Vec<String> },
    /// A fetch was rejected by the per-variable rate limit.
    RateLimitRejected { variable: String },
    /// Legacy code was classified above low risk before running.
    RiskyLegacyExecution { risk: String },
    /// The raw-command escape hatch was used.
    RawCommandExecuted,
    /// A response body exceeded the sanitization size cap.
    ResponseSizeExceeded { variable: String, max: usize },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Critical,
}

#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log_event(&self, event: SecurityEvent);
}

/// Audit logger that writes events through `tracing`.
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log_event(&self, event: SecurityEvent) {
        match event.severity {
            EventSeverity::Critical => {
                tracing::error!(job_id = ?event.job_id, event_type = ?event.event_type, "SECURITY");
            }
            EventSeverity::Warning => {
                tracing::warn!(job_id = ?event.job_id, event_type = ?event.event_type, "SECURITY");
            }
            EventSeverity::Info => {
                tracing::info!(job_id = ?event.job_id, event_type = ?event.event_type, "SECURITY");
            }
        }
    }
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: EventSeverity) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            job_id: None,
            event_type,
            severity,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

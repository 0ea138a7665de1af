//! Security building blocks: audit events, rate limiting, secret redaction,
//! legacy risk classification, and the static credential-reference scan.

mod audit;
mod rate_limit;
mod redact;
mod risk;
mod static_check;

pub use audit::{AuditLogger, EventSeverity, SecurityEvent, SecurityEventType, TracingAuditLogger};
pub use rate_limit::SlidingWindowRateLimiter;
pub use redact::SecretRedactor;
pub use risk::{classify, RiskLevel};
pub use static_check::scan_global_code;

//! # vaultexec — a credential-isolating execution engine
//!
//! `vaultexec` executes untrusted, dynamically supplied code on behalf of
//! remote callers while preventing that code from ever observing long-lived
//! credentials. Execution is split into two mandatory, ordered phases:
//!
//! - **Credential Phase**: one isolated subprocess per named data variable,
//!   run in dependency order, with credential-class environment variables
//!   available. Each subprocess performs exactly one outbound HTTP call and
//!   reports back over a single sentinel-prefixed stdout line.
//! - **Global Phase**: one subprocess running the caller's code, spawned with
//!   an environment that excludes every credential-class variable, given only
//!   the sanitized results of phase one.
//!
//! Supporting pieces:
//!
//! - **Dependency resolution**: data variables may depend on each other's
//!   results; execution follows a stable topological order and cycles are a
//!   hard validation error naming the cycle chain.
//! - **Value interpolation**: `${result.<path>}` markers rewrite a dependent
//!   spec's fields from an earlier result, fail-fast on unresolved paths.
//! - **Job scheduling**: submitted requests become persisted jobs admitted
//!   FIFO into a bounded worker pool, with progress tracking, cancellation,
//!   TTL expiry, and RUNNING-to-PENDING demotion across restarts.
//! - **Sanitization**: raw fetch results are reduced to a credential-free
//!   projection the moment they are parsed; response headers and upstream
//!   error detail never cross the phase boundary.
//!
//! Isolation is achieved by controlling the environment a spawned process
//! receives and by filtering what crosses between phases. It is **not** a
//! kernel-level sandbox: no namespaces, no seccomp, no virtualization.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vaultexec::{
//!     EngineConfig, ExecutionRequest, JobScheduler, MemoryJobStore, Orchestrator,
//!     SchedulerConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = Arc::new(Orchestrator::new(EngineConfig::default()));
//!     let scheduler = JobScheduler::new(
//!         SchedulerConfig::default(),
//!         orchestrator,
//!         Arc::new(MemoryJobStore::new()),
//!     )
//!     .await
//!     .unwrap();
//!
//!     let request: ExecutionRequest = serde_json::from_str(
//!         r#"{
//!             "secure_data_variables": {
//!                 "login": {
//!                     "url": "https://api.example.com/login",
//!                     "method": "POST",
//!                     "headers": {"X-Api-Key": "${SECURE_API_KEY}"}
//!                 }
//!             },
//!             "Global_code": "const user = login(); return user.data.id;"
//!         }"#,
//!     )
//!     .unwrap();
//!
//!     let job_id = scheduler.submit(request).await.unwrap();
//!     println!("submitted {job_id}");
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `legacy-exec` | Risk-classified single-phase compatibility path (default) |
//! | `raw-command` | Raw shell-command escape hatch, no isolation |

pub mod config;
pub mod error;
pub mod exec;
pub mod graph;
pub mod request;
pub mod runner;
pub mod sanitize;
pub mod scheduler;
pub mod security;
pub mod template;

pub use crate::config::{EngineConfig, SchedulerConfig};
pub use crate::error::{ExecError, JobError};
pub use crate::exec::{ExecContext, ExecOutcome, NodeScriptEngine, Orchestrator, ScriptEngine};
pub use crate::request::{
    DataSpec, DataSpecMap, ExecutionRequest, HttpMethod, PassedVariable, RequestMode,
};
pub use crate::runner::{
    GlobalOutcome, LineObserver, SubprocessOutput, SubprocessSpec, GLOBAL_EXEC_SENTINEL,
    SECURE_FETCH_SENTINEL,
};
pub use crate::sanitize::{NoopReviewer, OutputReviewer, ReviewVerdict, SanitizedResult};
pub use crate::scheduler::{
    FileJobStore, Job, JobExecutor, JobPage, JobScheduler, JobStats, JobStatus, JobStore,
    MemoryJobStore,
};
pub use crate::security::{AuditLogger, SecretRedactor, SecurityEvent, TracingAuditLogger};

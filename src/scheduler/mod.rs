//! Job scheduling: submission, bounded-concurrency admission, persistence,
//! progress tracking, cancellation, and expiry.

mod job;
#[allow(clippy::module_inception)]
mod scheduler;
mod store;

pub use job::{parse_progress_line, Job, JobFailure, JobStatus};
pub use scheduler::{JobExecutor, JobPage, JobScheduler, JobStats};
pub use store::{FileJobStore, JobStore, MemoryJobStore};

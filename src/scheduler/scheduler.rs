//! The job scheduler: bounded-concurrency admission over persisted jobs.
//!
//! The scheduler exclusively owns the job and worker tables; every mutation
//! goes through its operations and is written through to the store as a
//! whole-document read-modify-write, serialized by a persist lock. True
//! concurrency lives in the subprocesses each admitted job spawns, so the
//! coordinating layer itself needs no pool of threads.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::{ExecError, JobError};
use crate::exec::{ExecContext, Orchestrator};
use crate::request::ExecutionRequest;
use crate::runner::LineObserver;

use super::job::{parse_progress_line, Job, JobFailure, JobStatus};
use super::store::JobStore;

/// The seam between scheduler and orchestrator. Tests substitute a mock.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Synchronous checks run at submission, before a job is created.
    fn preflight(&self, request: &ExecutionRequest) -> Result<(), ExecError>;

    /// Execute the request to completion.
    async fn execute(&self, request: &ExecutionRequest, ctx: &ExecContext)
        -> Result<Value, ExecError>;
}

#[async_trait]
impl JobExecutor for Orchestrator {
    fn preflight(&self, request: &ExecutionRequest) -> Result<(), ExecError> {
        Orchestrator::preflight(self, request)
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        ctx: &ExecContext,
    ) -> Result<Value, ExecError> {
        Orchestrator::execute(self, request, ctx).await
    }
}

/// One page of a job listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: usize,
    pub has_more: bool,
}

/// Counts by status plus the live worker count.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub active_workers: usize,
}

struct WorkerSlot {
    handle: Option<tokio::task::JoinHandle<()>>,
}

struct JobTable {
    map: HashMap<String, Job>,
    next_seq: u64,
}

struct Inner {
    config: SchedulerConfig,
    executor: Arc<dyn JobExecutor>,
    store: Arc<dyn JobStore>,
    jobs: Mutex<JobTable>,
    workers: Mutex<HashMap<String, WorkerSlot>>,
    persist_lock: tokio::sync::Mutex<()>,
}

/// Accepts, persists, admits, tracks, and expires jobs.
pub struct JobScheduler {
    inner: Arc<Inner>,
    sweeper: CancellationToken,
}

impl JobScheduler {
    /// Load persisted jobs, demote any RUNNING ones to PENDING (their workers
    /// no longer exist), start the expiry sweeper, and retry admission.
    pub async fn new(
        config: SchedulerConfig,
        executor: Arc<dyn JobExecutor>,
        store: Arc<dyn JobStore>,
    ) -> Result<Self, JobError> {
        let mut map = store.load().await?;
        let mut demoted = 0usize;
        for job in map.values_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.touch();
                demoted += 1;
            }
        }
        let next_seq = map.values().map(|j| j.seq + 1).max().unwrap_or(0);

        let inner = Arc::new(Inner {
            config,
            executor,
            store,
            jobs: Mutex::new(JobTable { map, next_seq }),
            workers: Mutex::new(HashMap::new()),
            persist_lock: tokio::sync::Mutex::new(()),
        });

        if demoted > 0 {
            tracing::info!(demoted, "demoted interrupted RUNNING jobs to PENDING");
            Inner::persist(&inner).await?;
        }

        let sweeper = CancellationToken::new();
        Inner::spawn_sweeper(&inner, sweeper.clone());
        Inner::try_admit(&inner).await;

        Ok(Self { inner, sweeper })
    }

    /// Create a PENDING job for `request`, persist it, and attempt immediate
    /// admission. Preflight failures are returned synchronously and no job is
    /// created.
    pub async fn submit(&self, request: ExecutionRequest) -> Result<String, JobError> {
        self.inner.executor.preflight(&request)?;

        let job = {
            let mut table = self.inner.jobs.lock();
            let seq = table.next_seq;
            table.next_seq += 1;
            let job = Job::new(request, seq);
            table.map.insert(job.id.clone(), job.clone());
            job
        };
        tracing::debug!(job_id = %job.id, seq = job.seq, "job submitted");

        Inner::persist(&self.inner).await?;
        Inner::try_admit(&self.inner).await;
        Ok(job.id)
    }

    pub async fn get(&self, id: &str) -> Result<Job, JobError> {
        self.inner
            .jobs
            .lock()
            .map
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// List jobs in creation order, optionally filtered by status.
    pub async fn list(&self, filter: Option<JobStatus>, limit: usize, offset: usize) -> JobPage {
        let table = self.inner.jobs.lock();
        let mut jobs: Vec<Job> = table
            .map
            .values()
            .filter(|j| filter.map(|f| j.status == f).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.seq);
        let total = jobs.len();
        let jobs: Vec<Job> = jobs.into_iter().skip(offset).take(limit).collect();
        let has_more = offset + jobs.len() < total;
        JobPage {
            jobs,
            total,
            has_more,
        }
    }

    /// Cancel a job. A RUNNING job's worker receives termination and its pool
    /// slot frees immediately; terminal jobs are left untouched.
    pub async fn cancel(&self, id: &str) -> Result<Job, JobError> {
        let (job, handle) = {
            let mut workers = self.inner.workers.lock();
            let mut table = self.inner.jobs.lock();
            let Some(job) = table.map.get_mut(id) else {
                return Err(JobError::NotFound(id.to_string()));
            };
            match job.status {
                JobStatus::Pending => {
                    job.status = JobStatus::Cancelled;
                    job.completed_at = Some(Utc::now());
                    job.touch();
                    (job.clone(), None)
                }
                JobStatus::Running => {
                    job.status = JobStatus::Cancelled;
                    job.completed_at = Some(Utc::now());
                    job.touch();
                    let handle = workers.remove(id).and_then(|slot| slot.handle);
                    (job.clone(), handle)
                }
                _ => (job.clone(), None),
            }
        };

        if let Some(handle) = handle {
            // dropping the worker future drops the child process handle,
            // which carries kill-on-drop; exit is best-effort from here
            handle.abort();
            tracing::debug!(job_id = %id, "cancelled running job");
        }

        Inner::persist(&self.inner).await?;
        Inner::try_admit(&self.inner).await;
        Ok(job)
    }

    /// Cancel if live, then remove the job entirely.
    pub async fn delete(&self, id: &str) -> Result<(), JobError> {
        let handle = {
            let mut workers = self.inner.workers.lock();
            let mut table = self.inner.jobs.lock();
            if table.map.remove(id).is_none() {
                return Err(JobError::NotFound(id.to_string()));
            }
            workers.remove(id).and_then(|slot| slot.handle)
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        Inner::persist(&self.inner).await?;
        Inner::try_admit(&self.inner).await;
        Ok(())
    }

    pub async fn stats(&self) -> JobStats {
        let mut stats = JobStats {
            active_workers: self.inner.workers.lock().len(),
            ..JobStats::default()
        };
        let table = self.inner.jobs.lock();
        for job in table.map.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Stop the sweeper and abort all live workers. Jobs left RUNNING in the
    /// store are demoted to PENDING on the next startup.
    pub async fn shutdown(&self) {
        self.sweeper.cancel();
        let handles: Vec<_> = {
            let mut workers = self.inner.workers.lock();
            workers.drain().filter_map(|(_, slot)| slot.handle).collect()
        };
        for handle in handles {
            handle.abort();
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

impl Inner {
    /// Whole-store read-modify-write, serialized so snapshots land in order.
    async fn persist(inner: &Arc<Inner>) -> Result<(), JobError> {
        let _guard = inner.persist_lock.lock().await;
        let snapshot = inner.jobs.lock().map.clone();
        inner.store.persist(&snapshot).await
    }

    /// Admit pending jobs in creation order while pool capacity remains.
    /// Priority metadata on the request is deliberately not consulted.
    async fn try_admit(inner: &Arc<Inner>) {
        loop {
            let admitted = {
                let mut workers = inner.workers.lock();
                let mut table = inner.jobs.lock();
                if workers.len() >= inner.config.max_concurrent_jobs {
                    None
                } else {
                    let next_id = table
                        .map
                        .values()
                        .filter(|j| j.status == JobStatus::Pending)
                        .min_by_key(|j| j.seq)
                        .map(|j| j.id.clone());
                    match next_id {
                        Some(id) => match table.map.get_mut(&id) {
                            Some(job) => {
                                job.status = JobStatus::Running;
                                job.started_at = Some(Utc::now());
                                job.touch();
                                // reserve the slot inside the lock so a
                                // concurrent admission pass cannot overfill
                                workers.insert(id.clone(), WorkerSlot { handle: None });
                                Some((id, job.request.clone()))
                            }
                            None => None,
                        },
                        None => None,
                    }
                }
            };

            let Some((id, request)) = admitted else {
                break;
            };
            tracing::debug!(job_id = %id, "job admitted");

            if let Err(e) = Inner::persist(inner).await {
                tracing::warn!(job_id = %id, error = %e, "persist after admission failed");
            }

            let task_inner = Arc::clone(inner);
            let task_id = id.clone();
            let handle = tokio::spawn(Inner::run_job(task_inner, task_id));

            let mut workers = inner.workers.lock();
            match workers.get_mut(&id) {
                Some(slot) => slot.handle = Some(handle),
                // cancelled between admission and spawn
                None => handle.abort(),
            }
        }
    }

    // Returns an explicitly-boxed `Send` future so its type is sealed at this
    // definition. Without this, the admission cycle (run_job -> finish ->
    // release_worker -> try_admit -> spawns run_job) makes the `Send`
    // auto-trait analysis circular and rustc cannot prove the spawned future
    // is `Send`. Boxing this one edge is behaviour-preserving.
    fn run_job(inner: Arc<Inner>, id: String) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
        let request = {
            let table = inner.jobs.lock();
            match table.map.get(&id) {
                Some(job) if job.status == JobStatus::Running => Some(job.request.clone()),
                _ => None,
            }
        };
        let Some(request) = request else {
            Inner::release_worker(&inner, &id).await;
            return;
        };

        let observer = Inner::progress_observer(&inner, &id);
        let ctx = ExecContext {
            job_id: Some(id.clone()),
            extra_env: HashMap::new(),
            observer: Some(observer),
        };

        let result = inner.executor.execute(&request, &ctx).await;
        Inner::finish(inner, id, result).await;
        })
    }

    /// Opportunistic progress updates from live stdout lines.
    fn progress_observer(inner: &Arc<Inner>, id: &str) -> LineObserver {
        let weak = Arc::downgrade(inner);
        let id = id.to_string();
        Arc::new(move |line: &str| {
            let Some((progress, message)) = parse_progress_line(line) else {
                return;
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut table = inner.jobs.lock();
                if let Some(job) = table.map.get_mut(&id) {
                    if job.status == JobStatus::Running {
                        job.progress = progress;
                        job.progress_message = message;
                        job.touch();
                    }
                }
            }
            // write-through is best-effort for progress; terminal
            // transitions persist on their own path
            tokio::spawn(async move {
                let _ = Inner::persist(&inner).await;
            });
        })
    }

    async fn finish(inner: Arc<Inner>, id: String, result: Result<Value, ExecError>) {
        {
            let mut table = inner.jobs.lock();
            if let Some(job) = table.map.get_mut(&id) {
                if job.status == JobStatus::Running {
                    match result {
                        Ok(value) => {
                            job.status = JobStatus::Completed;
                            job.result = Some(value);
                            job.progress = 100;
                            job.progress_message = None;
                        }
                        Err(err) => {
                            let (stdout, stderr) = match &err {
                                ExecError::Execution { stdout, stderr, .. } => (
                                    (!stdout.is_empty()).then(|| stdout.clone()),
                                    (!stderr.is_empty()).then(|| stderr.clone()),
                                ),
                                _ => (None, None),
                            };
                            job.status = JobStatus::Failed;
                            job.error = Some(JobFailure {
                                kind: err.kind().to_string(),
                                message: err.to_string(),
                                stdout,
                                stderr,
                            });
                        }
                    }
                    job.completed_at = Some(Utc::now());
                    job.touch();
                }
            }
        }
        Inner::release_worker(&inner, &id).await;
    }

    async fn release_worker(inner: &Arc<Inner>, id: &str) {
        {
            inner.workers.lock().remove(id);
        }
        if let Err(e) = Inner::persist(inner).await {
            tracing::warn!(job_id = %id, error = %e, "persist after completion failed");
        }
        Inner::try_admit(inner).await;
    }

    fn spawn_sweeper(inner: &Arc<Inner>, token: CancellationToken) {
        let weak = Arc::downgrade(inner);
        let interval = Duration::from_secs(inner.config.sweep_interval_secs.max(1));
        let ttl = chrono::Duration::seconds(inner.config.job_ttl_secs as i64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let removed = {
                            let mut table = inner.jobs.lock();
                            let now = Utc::now();
                            let expired: Vec<String> = table
                                .map
                                .values()
                                .filter(|j| {
                                    j.status.is_terminal()
                                        && j.completed_at
                                            .map(|t| now - t > ttl)
                                            .unwrap_or(false)
                                })
                                .map(|j| j.id.clone())
                                .collect();
                            for id in &expired {
                                table.map.remove(id);
                            }
                            expired.len()
                        };
                        if removed > 0 {
                            tracing::debug!(removed, "swept expired terminal jobs");
                            let _ = Inner::persist(&inner).await;
                        }
                    }
                }
            }
        });
    }
}

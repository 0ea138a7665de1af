//! Durable job storage.
//!
//! The store is a single key-value document keyed by job id, rewritten in
//! full on every mutation. All writers serialize through the scheduler; the
//! store itself does no partial-record locking.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::JobError;

use super::job::Job;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load the whole store. An absent store is an empty one.
    async fn load(&self) -> Result<HashMap<String, Job>, JobError>;

    /// Replace the whole store with `jobs`.
    async fn persist(&self, jobs: &HashMap<String, Job>) -> Result<(), JobError>;
}

/// Volatile store for tests and embedded use.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: parking_lot::Mutex<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load(&self) -> Result<HashMap<String, Job>, JobError> {
        Ok(self.jobs.lock().clone())
    }

    async fn persist(&self, jobs: &HashMap<String, Job>) -> Result<(), JobError> {
        *self.jobs.lock() = jobs.clone();
        Ok(())
    }
}

/// JSON-document store on disk. Writes go to a sibling temp file first and
/// land by rename, so a crash mid-write never corrupts the document.
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn load(&self) -> Result<HashMap<String, Job>, JobError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn persist(&self, jobs: &HashMap<String, Job>) -> Result<(), JobError> {
        let body = serde_json::to_vec_pretty(jobs)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ExecutionRequest;
    use crate::scheduler::job::JobStatus;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryJobStore::new();
        let job = Job::new(ExecutionRequest::default(), 0);
        let mut jobs = HashMap::new();
        jobs.insert(job.id.clone(), job.clone());
        store.persist(&jobs).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&job.id].seq, 0);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path().join("jobs.json"));

        assert!(store.load().await.unwrap().is_empty());

        let mut job = Job::new(ExecutionRequest::default(), 1);
        job.status = JobStatus::Completed;
        let mut jobs = HashMap::new();
        jobs.insert(job.id.clone(), job.clone());
        store.persist(&jobs).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded[&job.id].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_file_store_rewrites_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path().join("jobs.json"));

        let a = Job::new(ExecutionRequest::default(), 0);
        let mut jobs = HashMap::new();
        jobs.insert(a.id.clone(), a.clone());
        store.persist(&jobs).await.unwrap();

        // removing the job and persisting removes it from disk
        jobs.clear();
        store.persist(&jobs).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }
}

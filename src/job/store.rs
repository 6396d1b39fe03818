use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{JobhostError, Result};
use crate::job::model::Job;

/// Result of applying a completed job to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Pending job moved to its terminal state
    Applied,
    /// Job already held this exact terminal state
    Duplicate,
}

/// Durable job state.
///
/// Intake calls [`insert`](JobStore::insert); the reconciler is the only
/// caller of [`complete`](JobStore::complete). A terminal job is never
/// overwritten: completing it again with the same result is a
/// [`CompletionOutcome::Duplicate`], with a different result an
/// [`JobhostError::AlreadyCompleted`].
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// All jobs, oldest first
    async fn list(&self) -> Result<Vec<Job>>;

    async fn complete(&self, job: &Job) -> Result<CompletionOutcome>;
}

/// Keeps jobs in a process-local map. Everything is lost on restart.
///
/// Jobs are never evicted, so a cap set with
/// [`with_capacity`](MemoryJobStore::with_capacity) is a lifetime limit.
#[derive(Debug)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
    max_jobs: Option<usize>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            max_jobs: None,
        }
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            max_jobs: Some(max_jobs),
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if self.max_jobs.is_some_and(|max| jobs.len() >= max) {
            return Err(JobhostError::QueueFull);
        }
        if jobs.contains_key(&job.id) {
            return Err(JobhostError::InvalidJob(format!("duplicate job id {}", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn complete(&self, job: &Job) -> Result<CompletionOutcome> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(&job.id)
            .ok_or(JobhostError::JobNotFound(job.id))?;

        if stored.status.is_terminal() {
            return if stored.same_result(job) {
                Ok(CompletionOutcome::Duplicate)
            } else {
                Err(JobhostError::AlreadyCompleted(job.id))
            };
        }

        stored.status = job.status;
        stored.output = job.output.clone();
        stored.worker = job.worker.clone();
        stored.completed_at = job.completed_at;
        Ok(CompletionOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::model::JobStatus;
    use chrono::Utc;

    fn completed(job: &Job, status: JobStatus, output: &str) -> Job {
        let mut done = job.clone();
        done.status = status;
        done.output = output.to_string();
        done.worker = Some("w1".to_string());
        done.completed_at = Some(Utc::now());
        done
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = MemoryJobStore::new();
        let job = Job::new("echo hi".to_string());
        store.insert(&job).await.unwrap();

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched, job);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let store = MemoryJobStore::new();
        let job = Job::new("true".to_string());
        store.insert(&job).await.unwrap();
        assert!(matches!(
            store.insert(&job).await,
            Err(JobhostError::InvalidJob(_))
        ));
    }

    #[tokio::test]
    async fn insert_respects_capacity() {
        let store = MemoryJobStore::with_capacity(2);
        store.insert(&Job::new("a".to_string())).await.unwrap();
        store.insert(&Job::new("b".to_string())).await.unwrap();
        assert!(matches!(
            store.insert(&Job::new("c".to_string())).await,
            Err(JobhostError::QueueFull)
        ));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn default_store_has_no_job_limit() {
        let store = MemoryJobStore::new();
        for i in 0..10_001 {
            store.insert(&Job::new(format!("echo {}", i))).await.unwrap();
        }
        assert_eq!(store.len().await, 10_001);
    }

    #[tokio::test]
    async fn list_is_sorted_by_creation() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let later = Job::with_id(Uuid::new_v4(), "later".to_string(), now);
        let earlier = Job::with_id(
            Uuid::new_v4(),
            "earlier".to_string(),
            now - chrono::Duration::seconds(10),
        );
        store.insert(&later).await.unwrap();
        store.insert(&earlier).await.unwrap();

        let commands: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.command)
            .collect();
        assert_eq!(commands, vec!["earlier", "later"]);
    }

    #[tokio::test]
    async fn complete_applies_once_then_reports_duplicate() {
        let store = MemoryJobStore::new();
        let job = Job::new("echo hello".to_string());
        store.insert(&job).await.unwrap();

        let done = completed(&job, JobStatus::Succeeded, "aGVsbG8K");
        assert_eq!(
            store.complete(&done).await.unwrap(),
            CompletionOutcome::Applied
        );
        let once = store.get(job.id).await.unwrap().unwrap();

        assert_eq!(
            store.complete(&done).await.unwrap(),
            CompletionOutcome::Duplicate
        );
        let twice = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.status, JobStatus::Succeeded);
        assert_eq!(twice.output, "aGVsbG8K");
    }

    #[tokio::test]
    async fn complete_never_overwrites_terminal_state() {
        let store = MemoryJobStore::new();
        let job = Job::new("exit 3".to_string());
        store.insert(&job).await.unwrap();

        store
            .complete(&completed(&job, JobStatus::Failed, ""))
            .await
            .unwrap();
        let err = store
            .complete(&completed(&job, JobStatus::Succeeded, "eA=="))
            .await
            .unwrap_err();
        assert!(matches!(err, JobhostError::AlreadyCompleted(id) if id == job.id));
        assert_eq!(
            store.get(job.id).await.unwrap().unwrap().status,
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn complete_unknown_job_fails() {
        let store = MemoryJobStore::new();
        let job = completed(&Job::new("true".to_string()), JobStatus::Succeeded, "");
        assert!(matches!(
            store.complete(&job).await,
            Err(JobhostError::JobNotFound(_))
        ));
    }
}

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{JobhostError, Result};
use crate::job::{Job, JobStore};
use crate::worker::Worker;

/// Job intake and read access.
///
/// `submit` persists a pending job and launches exactly one worker for it.
/// Reads go straight to the store and may observe the pending state before
/// the reconciler lands the terminal one.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    worker: Worker,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, worker: Worker) -> Self {
        Self { store, worker }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub async fn submit(&self, command: String) -> Result<Job> {
        if command.trim().is_empty() {
            return Err(JobhostError::InvalidJob("cmd_string is empty".to_string()));
        }

        let job = Job::new(command);
        self.store.insert(&job).await?;
        tracing::info!(job_id = %job.id, command = %job.command, "Job submitted");

        self.worker.spawn(job.clone());
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<Job> {
        self.store
            .get(id)
            .await?
            .ok_or(JobhostError::JobNotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Job>> {
        self.store.list().await
    }
}

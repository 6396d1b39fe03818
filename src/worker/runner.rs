use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::{LaunchErrorPolicy, WorkerConfig};
use crate::job::{Job, JobStatus};
use crate::worker::executor::JobExecutor;
use crate::worker::CompletionSender;

/// How a single worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Completed job was handed to the completion channel
    Reported(JobStatus),
    /// Executor errored and the policy is `Abandon`; nothing was sent
    Abandoned,
    /// The reconciler is gone; the result was dropped
    ChannelClosed,
}

/// Executes jobs and reports them on the completion channel.
///
/// Cloning is cheap; all clones share one admission semaphore, so at most
/// `max_concurrent_jobs` jobs are executing or waiting to report at a time.
/// Workers never touch the job store.
#[derive(Debug, Clone)]
pub struct Worker {
    worker_id: Arc<str>,
    executor: JobExecutor,
    policy: LaunchErrorPolicy,
    completions: CompletionSender,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(config: WorkerConfig, completions: CompletionSender) -> Self {
        Self {
            worker_id: Arc::from(config.worker_id),
            executor: JobExecutor::new(config.executor),
            policy: config.launch_error_policy,
            completions,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Jobs that could start right now without waiting for admission
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on its own task.
    pub fn spawn(&self, job: Job) -> JoinHandle<RunOutcome> {
        let worker = self.clone();
        tokio::spawn(async move { worker.run(job).await })
    }

    /// Execute `job.command` once and send the completed job.
    ///
    /// The admission permit is held across the send, so a full completion
    /// channel also stalls new executions.
    pub async fn run(&self, mut job: Job) -> RunOutcome {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!(job_id = %job.id, "Worker pool closed, dropping job");
                return RunOutcome::Abandoned;
            }
        };

        match self.executor.execute(&job.command).await {
            Ok(outcome) => {
                job.status = outcome.status;
                job.output = outcome.output;
            }
            Err(e) => match self.policy {
                LaunchErrorPolicy::Abandon => {
                    tracing::error!(job_id = %job.id, error = %e, "Execution error, abandoning job");
                    return RunOutcome::Abandoned;
                }
                LaunchErrorPolicy::Report => {
                    tracing::error!(job_id = %job.id, error = %e, "Execution error, reporting job");
                    job.status = JobStatus::ExecutionError;
                    job.output = String::new();
                }
            },
        }

        job.worker = Some(self.worker_id.to_string());
        job.completed_at = Some(Utc::now());

        let job_id = job.id;
        let status = job.status;
        if self.completions.send(job).await.is_err() {
            tracing::warn!(job_id = %job_id, "Completion channel closed, result dropped");
            return RunOutcome::ChannelClosed;
        }

        tracing::debug!(job_id = %job_id, status = %status, "Job completion queued");
        RunOutcome::Reported(status)
    }
}

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::job::{CompletionOutcome, Job, JobStore};
use crate::worker::CompletionReceiver;

/// Counts of what the reconciler did over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub applied: u64,
    pub duplicates: u64,
    pub failed: u64,
}

/// Single consumer of the completion channel and sole writer of terminal
/// job state.
///
/// Completions are written in arrival order. A failed write is logged and
/// skipped; it is not retried.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn JobStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Persist one completed job.
    pub async fn apply(&self, job: &Job) -> Result<CompletionOutcome> {
        let outcome = self.store.complete(job).await?;
        match outcome {
            CompletionOutcome::Applied => {
                tracing::info!(job_id = %job.id, status = %job.status, worker = ?job.worker, "Job completed");
            }
            CompletionOutcome::Duplicate => {
                tracing::debug!(job_id = %job.id, "Duplicate completion ignored");
            }
        }
        Ok(outcome)
    }

    /// Drain the completion channel until every sender is dropped or
    /// `shutdown` fires. On shutdown, completions already buffered are
    /// still written before returning.
    pub async fn run(
        self,
        mut completions: CompletionReceiver,
        shutdown: CancellationToken,
    ) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        tracing::info!("Completion reconciler started");

        loop {
            tokio::select! {
                received = completions.recv() => match received {
                    Some(job) => self.record(&job, &mut stats).await,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    completions.close();
                    while let Some(job) = completions.recv().await {
                        self.record(&job, &mut stats).await;
                    }
                    break;
                }
            }
        }

        tracing::info!(
            applied = stats.applied,
            duplicates = stats.duplicates,
            failed = stats.failed,
            "Completion reconciler stopped"
        );
        stats
    }

    async fn record(&self, job: &Job, stats: &mut ReconcileStats) {
        match self.apply(job).await {
            Ok(CompletionOutcome::Applied) => stats.applied += 1,
            Ok(CompletionOutcome::Duplicate) => stats.duplicates += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::error!(job_id = %job.id, error = %e, "Failed to persist job completion");
            }
        }
    }
}

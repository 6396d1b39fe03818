use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::run_api;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::job::{JobStore, MemoryJobStore, SqliteJobStore};
use crate::service::JobService;
use crate::worker::{completion_channel, CompletionReceiver, ReconcileStats, Reconciler, Worker};

/// Wires the store, the completion channel, workers, the reconciler and the
/// HTTP API together.
pub struct Server {
    pub config: ServerConfig,
    pub service: JobService,
    reconciler: Reconciler,
    completions: CompletionReceiver,
}

impl Server {
    /// Open the configured store and build the server around it.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let store: Arc<dyn JobStore> = match &config.database_url {
            Some(url) => Arc::new(SqliteJobStore::connect(url).await?),
            None => {
                tracing::warn!("No database configured, jobs are kept in memory only");
                match config.max_stored_jobs {
                    Some(max) => Arc::new(MemoryJobStore::with_capacity(max)),
                    None => Arc::new(MemoryJobStore::new()),
                }
            }
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn JobStore>) -> Self {
        // The one completion channel for this process
        let (completion_tx, completion_rx) = completion_channel(config.completion_capacity);

        let worker = Worker::new(config.worker.clone(), completion_tx);
        let service = JobService::new(store.clone(), worker);

        Self {
            config,
            service,
            reconciler: Reconciler::new(store),
            completions: completion_rx,
        }
    }

    /// Run until `shutdown` fires.
    ///
    /// 1. Spawns the completion reconciler
    /// 2. Serves the HTTP API (blocking)
    /// 3. On shutdown, waits for the reconciler to flush buffered completions
    ///
    /// Jobs still executing at shutdown are not waited for.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP listener cannot be bound or fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<ReconcileStats> {
        let Self {
            config,
            service,
            reconciler,
            completions,
        } = self;

        tracing::info!(
            listen_addr = %config.listen_addr,
            worker_id = %config.worker.worker_id,
            completion_capacity = config.completion_capacity,
            max_concurrent_jobs = config.worker.max_concurrent_jobs,
            execution_timeout = ?config.worker.executor.timeout,
            "Starting jobhost server"
        );

        let reconciler_handle = tokio::spawn(reconciler.run(completions, shutdown.clone()));

        let served = run_api(config.listen_addr, service, shutdown.clone()).await;
        // Stop the reconciler even when the API failed to start
        shutdown.cancel();

        let stats = reconciler_handle.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Reconciler task failed");
            ReconcileStats::default()
        });
        served?;
        Ok(stats)
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default capacity of the completion channel between workers and the reconciler.
pub const DEFAULT_COMPLETION_CAPACITY: usize = 100;

/// Default cap on jobs executing (or waiting to report) at the same time.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 64;

/// Configuration for running commands in a child shell.
///
/// The child gets `HOME` pointed at `scratch_dir`, and `scratch_dir/.config`
/// is created before launch. Hosts without a writable home directory (e.g.
/// serverless runtimes) need this for tools that write dotfiles.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Shell used as `<shell> -c <command>`
    pub shell: PathBuf,
    /// Directory exported to the child as `HOME`
    pub scratch_dir: PathBuf,
    /// Subdirectory of `scratch_dir` that must exist before launch
    pub config_subdir: String,
    /// Kill the command after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            scratch_dir: PathBuf::from("/tmp"),
            config_subdir: ".config".to_string(),
            timeout: None,
        }
    }
}

impl ExecutorConfig {
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn config_dir(&self) -> PathBuf {
        self.scratch_dir.join(&self.config_subdir)
    }
}

/// What a worker does when the executor cannot produce a status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchErrorPolicy {
    /// Record the job as `ExecutionError` and report it like any completion.
    #[default]
    Report,
    /// Log and drop the job. It stays pending forever.
    Abandon,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Recorded on each job this process completes
    pub worker_id: String,
    pub max_concurrent_jobs: usize,
    pub launch_error_policy: LaunchErrorPolicy,
    pub executor: ExecutorConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "local".to_string(),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            launch_error_policy: LaunchErrorPolicy::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// SQLite URL. `None` keeps jobs in memory.
    pub database_url: Option<String>,
    /// Lifetime cap on jobs held by the in-memory store. `None` is unbounded.
    pub max_stored_jobs: Option<usize>,
    pub completion_capacity: usize,
    pub worker: WorkerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:8080"
                .parse()
                .expect("default listen address is valid"),
            database_url: None,
            max_stored_jobs: None,
            completion_capacity: DEFAULT_COMPLETION_CAPACITY,
            worker: WorkerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_max_stored_jobs(mut self, max: usize) -> Self {
        self.max_stored_jobs = Some(max);
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }
}

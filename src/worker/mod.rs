//! Job execution and completion tracking.
//!
//! # Components
//!
//! - [`JobExecutor`]: runs one shell command with `HOME` pointed at a scratch
//!   directory and base64-encodes its combined output
//! - [`Worker`]: executes a job once and sends the completed job on the
//!   completion channel
//! - [`Reconciler`]: drains the completion channel into the job store
//!
//! # Flow
//!
//! 1. Intake persists a pending job and calls [`Worker::spawn`]
//! 2. The worker waits for an admission permit, then runs `sh -c <command>`
//! 3. The completed job is sent on the bounded completion channel, waiting
//!    while it is full
//! 4. The reconciler writes the terminal state to the store
//!
//! # Security Note
//!
//! Commands are run as given. There is no allow-list and no sandbox beyond
//! the `HOME` override.

pub mod executor;
pub mod reconciler;
pub mod runner;

use tokio::sync::mpsc;

use crate::job::Job;

pub use executor::{CommandOutcome, JobExecutor};
pub use reconciler::{ReconcileStats, Reconciler};
pub use runner::{RunOutcome, Worker};

pub type CompletionSender = mpsc::Sender<Job>;
pub type CompletionReceiver = mpsc::Receiver<Job>;

/// Create the bounded channel that carries completed jobs to the reconciler.
///
/// Call once at startup and hand the two halves to the [`Worker`] and the
/// [`Reconciler`].
pub fn completion_channel(capacity: usize) -> (CompletionSender, CompletionReceiver) {
    mpsc::channel(capacity.max(1))
}

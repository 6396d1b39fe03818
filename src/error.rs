use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum JobhostError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job {0} already has a different terminal state")]
    AlreadyCompleted(Uuid),

    #[error("Job store is at capacity")]
    QueueFull,

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, JobhostError>;

/// Errors where the executor could not produce a status for a command.
///
/// A command that runs and exits non-zero is not an `ExecError`; it is a
/// normal [`CommandOutcome`](crate::worker::executor::CommandOutcome) with a
/// failed status.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to launch command: {0}")]
    Launch(#[source] std::io::Error),

    #[error("failed waiting for command: {0}")]
    Wait(#[source] std::io::Error),

    #[error("command timed out after {0:?}")]
    TimedOut(Duration),
}

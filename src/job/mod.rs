//! Job records and where they are persisted.
//!
//! - [`Job`] / [`JobStatus`]: the record and its outcome code
//! - [`JobStore`]: persistence seam shared by intake and the reconciler
//! - [`MemoryJobStore`], [`SqliteJobStore`]: the two store backends

pub mod model;
pub mod sqlite;
pub mod store;

pub use model::{Job, JobStatus};
pub use sqlite::SqliteJobStore;
pub use store::{CompletionOutcome, JobStore, MemoryJobStore};

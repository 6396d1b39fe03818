use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a job. On the wire this is an integer code, or `null` while pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Option<i32>", try_from = "Option<i32>")]
pub enum JobStatus {
    Pending,
    /// Command exited 0
    Succeeded,
    /// Command ran and exited non-zero
    Failed,
    /// Command could not be launched or waited on
    ExecutionError,
}

impl JobStatus {
    pub fn code(self) -> Option<i32> {
        match self {
            JobStatus::Pending => None,
            JobStatus::Succeeded => Some(0),
            JobStatus::Failed => Some(1),
            JobStatus::ExecutionError => Some(2),
        }
    }

    pub fn from_code(code: Option<i32>) -> Option<Self> {
        match code {
            None => Some(JobStatus::Pending),
            Some(0) => Some(JobStatus::Succeeded),
            Some(1) => Some(JobStatus::Failed),
            Some(2) => Some(JobStatus::ExecutionError),
            Some(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != JobStatus::Pending
    }
}

impl From<JobStatus> for Option<i32> {
    fn from(status: JobStatus) -> Self {
        status.code()
    }
}

impl TryFrom<Option<i32>> for JobStatus {
    type Error = String;

    fn try_from(code: Option<i32>) -> Result<Self, Self::Error> {
        JobStatus::from_code(code).ok_or_else(|| format!("unknown job status code {:?}", code))
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::ExecutionError => write!(f, "execution_error"),
        }
    }
}

/// One command to run and, once finished, its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: Uuid,
    #[serde(rename = "cmd_string")]
    pub command: String,
    pub status: JobStatus,
    /// Base64 of the combined stdout+stderr. Empty until success.
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub worker: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(command: String) -> Self {
        Self::with_id(Uuid::new_v4(), command, Utc::now())
    }

    pub fn with_id(id: Uuid, command: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            command,
            status: JobStatus::Pending,
            output: String::new(),
            worker: None,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    /// True when `other` carries the same terminal result as `self`.
    pub fn same_result(&self, other: &Job) -> bool {
        self.status == other.status && self.output == other.output && self.worker == other.worker
    }
}

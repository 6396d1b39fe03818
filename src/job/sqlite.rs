//! SQLite-backed job store.
//!
//! Jobs live in a single `jobs` table created on connect. The terminal update
//! is guarded by `status IS NULL`, so the database itself enforces that a job
//! leaves the pending state only once.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{JobhostError, Result};
use crate::job::model::{Job, JobStatus};
use crate::job::store::{CompletionOutcome, JobStore};

const SELECT_COLUMNS: &str =
    "SELECT job_id, cmd_string, status, output, worker, created_at, completed_at FROM jobs";

#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = Self::pool_options(url).connect_with(options).await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(url, "Connected to SQLite job store");
        Ok(store)
    }

    fn pool_options(url: &str) -> SqlitePoolOptions {
        if url.contains(":memory:") {
            // An in-memory database lives only as long as its last connection,
            // so pin exactly one and never let the pool reap it
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id        TEXT PRIMARY KEY,
                cmd_string    TEXT NOT NULL,
                status        INTEGER NULL,
                output        TEXT NOT NULL DEFAULT '',
                worker        TEXT NULL,
                created_at    TEXT NOT NULL,
                completed_at  TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn job_from_row(row: &SqliteRow) -> Result<Job> {
        let id: String = row.try_get("job_id")?;
        let code: Option<i32> = row.try_get("status")?;

        Ok(Job {
            id: Uuid::parse_str(&id)
                .map_err(|e| JobhostError::Internal(format!("bad job_id {id:?}: {e}")))?,
            command: row.try_get("cmd_string")?,
            status: JobStatus::from_code(code).ok_or_else(|| {
                JobhostError::Internal(format!("bad status code {code:?} for job {id}"))
            })?,
            output: row.try_get("output")?,
            worker: row.try_get("worker")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (job_id, cmd_string, status, output, worker, created_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(&job.command)
        .bind(job.status.code())
        .bind(&job.output)
        .bind(&job.worker)
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE job_id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::job_from_row).collect()
    }

    async fn complete(&self, job: &Job) -> Result<CompletionOutcome> {
        let updated = sqlx::query(
            "UPDATE jobs SET status = ?, output = ?, worker = ?, completed_at = ? \
             WHERE job_id = ? AND status IS NULL",
        )
        .bind(job.status.code())
        .bind(&job.output)
        .bind(&job.worker)
        .bind(job.completed_at)
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(CompletionOutcome::Applied);
        }

        match self.get(job.id).await? {
            None => Err(JobhostError::JobNotFound(job.id)),
            Some(stored) if stored.same_result(job) => Ok(CompletionOutcome::Duplicate),
            Some(_) => Err(JobhostError::AlreadyCompleted(job.id)),
        }
    }
}

//! Storage traits and error types

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::state::JobStatus;
use crate::storage::{Job, JobResult};

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job {0} is already finalized")]
    JobFinalized(Uuid),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for jobs and their per-page results
///
/// Implementations must be safe to share between worker tasks. Once a job is
/// finalized its record and result list never change again.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &Job) -> StoreResult<()>;

    /// Moves a job to Running and stamps `started_at` on first start
    ///
    /// A job that is already running may be marked again when it is
    /// redelivered after a restart.
    async fn mark_running(&self, id: Uuid) -> StoreResult<()>;

    async fn update_job_progress(&self, id: Uuid, completed: u32, total: u32) -> StoreResult<()>;

    /// Appends one result; rejected once the job is terminal
    async fn append_result(&self, id: Uuid, result: &JobResult) -> StoreResult<()>;

    /// Moves a job into a terminal state; this is the last write for a job
    async fn finalize_job(&self, id: Uuid, status: JobStatus, error: Option<&str>)
        -> StoreResult<()>;

    /// Drops partial results and progress so a redelivered job starts over
    async fn reset_results(&self, id: Uuid) -> StoreResult<()>;

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Results in the order they were appended
    async fn get_results(&self, id: Uuid) -> StoreResult<Vec<JobResult>>;

    /// Pending and running jobs, oldest first
    async fn list_unfinished(&self) -> StoreResult<Vec<Job>>;
}

/// Checks that `to` is a legal next status for a job currently in `from`
pub(crate) fn check_transition(from: JobStatus, to: JobStatus) -> StoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { from, to })
    }
}

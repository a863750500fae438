//! SQLite job store
//!
//! rusqlite is synchronous, so every operation runs on the blocking pool
//! against one shared connection.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::state::{JobKind, JobStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{check_transition, JobStore, StoreError, StoreResult};
use crate::storage::{Job, JobResult};

const JOB_COLUMNS: &str = "id, kind, status, spec, user_id, total_units, completed_units, \
                           error, created_at, started_at, completed_at";

/// SQLite storage backend
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Database(format!("blocking task failed: {}", e)))?
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("bad timestamp {:?}: {}", value, e)))
}

/// A jobs row before conversion
struct JobRow {
    id: String,
    kind: String,
    status: String,
    spec: String,
    user_id: String,
    total_units: u32,
    completed_units: u32,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            status: row.get(2)?,
            spec: row.get(3)?,
            user_id: row.get(4)?,
            total_units: row.get(5)?,
            completed_units: row.get(6)?,
            error: row.get(7)?,
            created_at: row.get(8)?,
            started_at: row.get(9)?,
            completed_at: row.get(10)?,
        })
    }

    fn into_job(self) -> StoreResult<Job> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Database(format!("bad job id {:?}: {}", self.id, e)))?;
        let kind = JobKind::from_db_string(&self.kind)
            .ok_or_else(|| StoreError::Database(format!("unknown job kind {:?}", self.kind)))?;
        let status = JobStatus::from_db_string(&self.status)
            .ok_or_else(|| StoreError::Database(format!("unknown status {:?}", self.status)))?;

        Ok(Job {
            id,
            kind,
            status,
            spec: serde_json::from_str(&self.spec)?,
            user_id: self.user_id,
            total_units: self.total_units,
            completed_units: self.completed_units,
            error: self.error,
            created_at: parse_timestamp(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_timestamp).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn load_job(conn: &Connection, id: Uuid) -> StoreResult<Option<Job>> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
    conn.query_row(&sql, params![id.to_string()], JobRow::from_row)
        .optional()?
        .map(JobRow::into_job)
        .transpose()
}

fn load_status(conn: &Connection, id: Uuid) -> StoreResult<JobStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM jobs WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    let status = status.ok_or(StoreError::JobNotFound(id))?;
    JobStatus::from_db_string(&status)
        .ok_or_else(|| StoreError::Database(format!("unknown status {:?}", status)))
}

fn ensure_open(conn: &Connection, id: Uuid) -> StoreResult<()> {
    if load_status(conn, id)?.is_terminal() {
        return Err(StoreError::JobFinalized(id));
    }
    Ok(())
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        let job = job.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    JOB_COLUMNS
                ),
                params![
                    job.id.to_string(),
                    job.kind.to_db_string(),
                    job.status.to_db_string(),
                    serde_json::to_string(&job.spec)?,
                    job.user_id,
                    job.total_units,
                    job.completed_units,
                    job.error,
                    timestamp(&job.created_at),
                    job.started_at.as_ref().map(timestamp),
                    job.completed_at.as_ref().map(timestamp),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn mark_running(&self, id: Uuid) -> StoreResult<()> {
        self.with_conn(move |conn| {
            check_transition(load_status(conn, id)?, JobStatus::Running)?;
            conn.execute(
                "UPDATE jobs SET status = ?1, started_at = COALESCE(started_at, ?2) WHERE id = ?3",
                params![
                    JobStatus::Running.to_db_string(),
                    timestamp(&Utc::now()),
                    id.to_string()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_job_progress(&self, id: Uuid, completed: u32, total: u32) -> StoreResult<()> {
        self.with_conn(move |conn| {
            ensure_open(conn, id)?;
            conn.execute(
                "UPDATE jobs SET completed_units = ?1, total_units = ?2 WHERE id = ?3",
                params![completed, total, id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn append_result(&self, id: Uuid, result: &JobResult) -> StoreResult<()> {
        let payload = serde_json::to_string(result)?;
        let url = result.url.clone();
        let success = result.success;

        self.with_conn(move |conn| {
            ensure_open(conn, id)?;
            conn.execute(
                "INSERT INTO job_results (job_id, url, success, payload) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), url, success, payload],
            )?;
            Ok(())
        })
        .await
    }

    async fn finalize_job(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let error = error.map(str::to_string);
        self.with_conn(move |conn| {
            let current = load_status(conn, id)?;
            if !status.is_terminal() {
                return Err(StoreError::InvalidTransition {
                    from: current,
                    to: status,
                });
            }
            check_transition(current, status)?;

            conn.execute(
                "UPDATE jobs SET status = ?1, error = ?2, completed_at = ?3 WHERE id = ?4",
                params![
                    status.to_db_string(),
                    error,
                    timestamp(&Utc::now()),
                    id.to_string()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn reset_results(&self, id: Uuid) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let job = load_job(conn, id)?.ok_or(StoreError::JobNotFound(id))?;
            if job.status.is_terminal() {
                return Err(StoreError::JobFinalized(id));
            }

            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM job_results WHERE job_id = ?1",
                params![id.to_string()],
            )?;
            tx.execute(
                "UPDATE jobs SET completed_units = 0, total_units = ?1 WHERE id = ?2",
                params![job.spec.initial_total(), id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        self.with_conn(move |conn| load_job(conn, id)).await
    }

    async fn get_results(&self, id: Uuid) -> StoreResult<Vec<JobResult>> {
        self.with_conn(move |conn| {
            load_status(conn, id)?;

            let mut stmt =
                conn.prepare("SELECT payload FROM job_results WHERE job_id = ?1 ORDER BY id")?;
            let payloads = stmt
                .query_map(params![id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            payloads
                .iter()
                .map(|payload| serde_json::from_str(payload).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn list_unfinished(&self) -> StoreResult<Vec<Job>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM jobs WHERE status IN (?1, ?2) ORDER BY created_at",
                JOB_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![
                        JobStatus::Pending.to_db_string(),
                        JobStatus::Running.to_db_string()
                    ],
                    JobRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(JobRow::into_job).collect()
        })
        .await
    }
}

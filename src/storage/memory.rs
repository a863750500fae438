//! In-memory job store
//!
//! Used when no database path is configured, and by tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::state::JobStatus;
use crate::storage::traits::{check_transition, JobStore, StoreError, StoreResult};
use crate::storage::{Job, JobResult};

#[derive(Debug)]
struct Entry {
    job: Job,
    results: Vec<JobResult>,
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn entry_mut(entries: &mut HashMap<Uuid, Entry>, id: Uuid) -> StoreResult<&mut Entry> {
    entries.get_mut(&id).ok_or(StoreError::JobNotFound(id))
}

fn open_entry(entries: &mut HashMap<Uuid, Entry>, id: Uuid) -> StoreResult<&mut Entry> {
    let entry = entry_mut(entries, id)?;
    if entry.job.status.is_terminal() {
        return Err(StoreError::JobFinalized(id));
    }
    Ok(entry)
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&job.id) {
            return Err(StoreError::Database(format!("Duplicate job id {}", job.id)));
        }
        entries.insert(
            job.id,
            Entry {
                job: job.clone(),
                results: Vec::new(),
            },
        );
        Ok(())
    }

    async fn mark_running(&self, id: Uuid) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entry_mut(&mut entries, id)?;
        check_transition(entry.job.status, JobStatus::Running)?;

        entry.job.status = JobStatus::Running;
        if entry.job.started_at.is_none() {
            entry.job.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_job_progress(&self, id: Uuid, completed: u32, total: u32) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = open_entry(&mut entries, id)?;
        entry.job.completed_units = completed;
        entry.job.total_units = total;
        Ok(())
    }

    async fn append_result(&self, id: Uuid, result: &JobResult) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = open_entry(&mut entries, id)?;
        entry.results.push(result.clone());
        Ok(())
    }

    async fn finalize_job(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entry_mut(&mut entries, id)?;
        if !status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: entry.job.status,
                to: status,
            });
        }
        check_transition(entry.job.status, status)?;

        entry.job.status = status;
        entry.job.error = error.map(str::to_string);
        entry.job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn reset_results(&self, id: Uuid) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = open_entry(&mut entries, id)?;
        entry.results.clear();
        entry.job.completed_units = 0;
        entry.job.total_units = entry.job.spec.initial_total();
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id).map(|entry| entry.job.clone()))
    }

    async fn get_results(&self, id: Uuid) -> StoreResult<Vec<JobResult>> {
        let entries = self.entries.read().await;
        entries
            .get(&id)
            .map(|entry| entry.results.clone())
            .ok_or(StoreError::JobNotFound(id))
    }

    async fn list_unfinished(&self) -> StoreResult<Vec<Job>> {
        let entries = self.entries.read().await;
        let mut jobs: Vec<Job> = entries
            .values()
            .filter(|entry| !entry.job.status.is_terminal())
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}

//! Storage module for persisting jobs and their results
//!
//! This module handles:
//! - The `JobStore` trait the orchestrator writes through
//! - An in-memory store for ephemeral runs and tests
//! - A SQLite store for durable, resumable jobs

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StoreError, StoreResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::extract::PageContent;
use crate::jobs::JobSpec;
use crate::state::{JobKind, JobStatus};

/// Opens the configured store: SQLite when a path is given, memory otherwise
pub fn open_store(path: Option<&Path>) -> StoreResult<Arc<dyn JobStore>> {
    match path {
        Some(path) => Ok(Arc::new(SqliteJobStore::new(path)?)),
        None => Ok(Arc::new(MemoryJobStore::new())),
    }
}

/// A tracked unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub spec: JobSpec,
    pub user_id: String,
    pub total_units: u32,
    pub completed_units: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a pending job for `spec`
    pub fn new(user_id: &str, spec: JobSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: spec.kind(),
            status: JobStatus::Pending,
            total_units: spec.initial_total(),
            spec,
            user_id: user_id.to_string(),
            completed_units: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Outcome for one page of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub url: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<PageContent>,
    /// Search-hit snippet, only set for search jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl JobResult {
    pub fn success(url: &str, content: PageContent) -> Self {
        Self {
            url: url.to_string(),
            success: true,
            error: None,
            content: Some(content),
            snippet: None,
        }
    }

    pub fn failure(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            error: Some(error.into()),
            content: None,
            snippet: None,
        }
    }

    /// A bare URL entry, as produced by map jobs
    pub fn link(url: &str) -> Self {
        Self {
            url: url.to_string(),
            success: true,
            error: None,
            content: None,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: Option<String>) -> Self {
        self.snippet = snippet;
        self
    }
}

//! Harvest Engine: escalating page fetches, BFS crawls and tracked jobs
//!
//! This crate fetches web pages through a chain of increasingly expensive
//! strategies, extracts structured content from them, crawls link graphs
//! breadth-first, and wraps all of it into cancellable, resumable jobs.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod document;
pub mod extract;
pub mod fetch;
pub mod jobs;
pub mod mapper;
pub mod ratelimit;
pub mod robots;
pub mod scrape;
pub mod search;
pub mod state;
pub mod storage;
mod tasks;
pub mod url;

use thiserror::Error;

/// Main error type for Harvest Engine operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] jobs::SubmitError),

    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Errors raised while fetching a page
///
/// Everything except `Exhausted` is transient: the escalator treats it as
/// "blocked" and moves on to the next strategy.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Browser error for {url}: {message}")]
    Browser { url: String, message: String },

    #[error("All fetch strategies exhausted for {url}")]
    Exhausted { url: String },
}

impl FetchError {
    /// Returns true for errors the escalator recovers from locally
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }
}

/// Result type alias for Harvest Engine operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use jobs::{JobOrchestrator, JobSpec};
pub use state::{JobKind, JobStatus};
pub use url::normalize_url;

//! Typed job requests and their admission-time validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JobsConfig;
use crate::extract::Format;
use crate::normalize_url;
use crate::scrape::ScrapeOptions;
use crate::state::JobKind;
use crate::url::compile_globs;

/// Longest per-strategy timeout a request may ask for (milliseconds)
const MAX_TIMEOUT_MS: u64 = 300_000;

/// Longest post-load wait a request may ask for (milliseconds)
const MAX_WAIT_FOR_MS: u64 = 60_000;

/// A malformed job request; the job is never created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("Invalid path pattern: {0}")]
    InvalidPattern(String),
}

fn check_url(url: &str) -> Result<(), ValidationError> {
    normalize_url(url)
        .map(|_| ())
        .map_err(|e| ValidationError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_scrape_options(options: &ScrapeOptions) -> Result<(), ValidationError> {
    if options.formats.is_empty() {
        return Err(ValidationError::Empty("formats"));
    }
    check_range("timeout", options.timeout, 1, MAX_TIMEOUT_MS)?;
    check_range("wait_for", options.wait_for, 0, MAX_WAIT_FOR_MS)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub url: String,
    #[serde(flatten)]
    pub options: ScrapeOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlJob {
    pub url: String,
    pub max_pages: u32,
    pub max_depth: u32,
    /// Path globs; when non-empty a link's path must match one of them
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub allow_external_links: bool,
    pub respect_robots_txt: bool,
    /// Parallel fetches within this crawl, clamped to 1..=10
    pub concurrency: usize,
    pub scrape_options: ScrapeOptions,
}

impl Default for CrawlJob {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_pages: 100,
            max_depth: 3,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            allow_external_links: false,
            respect_robots_txt: true,
            concurrency: 5,
            scrape_options: ScrapeOptions::default(),
        }
    }
}

/// Per-URL overrides inside a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchItem {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<Format>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_main_content: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl BatchItem {
    /// Shared options with this item's overrides applied
    pub fn apply(&self, shared: &ScrapeOptions) -> ScrapeOptions {
        let mut options = shared.clone();
        if let Some(formats) = &self.formats {
            options.formats = formats.clone();
        }
        if let Some(only_main_content) = self.only_main_content {
            options.only_main_content = only_main_content;
        }
        if let Some(wait_for) = self.wait_for {
            options.wait_for = wait_for;
        }
        if let Some(timeout) = self.timeout {
            options.timeout = timeout;
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchJob {
    pub urls: Vec<String>,
    pub items: Vec<BatchItem>,
    pub concurrency: usize,
    #[serde(flatten)]
    pub options: ScrapeOptions,
}

impl Default for BatchJob {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            items: Vec::new(),
            concurrency: 5,
            options: ScrapeOptions::default(),
        }
    }
}

impl BatchJob {
    /// Every URL with its effective options: plain URLs first, then items
    pub fn entries(&self) -> Vec<(String, ScrapeOptions)> {
        self.urls
            .iter()
            .map(|url| (url.clone(), self.options.clone()))
            .chain(
                self.items
                    .iter()
                    .map(|item| (item.url.clone(), item.apply(&self.options))),
            )
            .collect()
    }

    pub fn len(&self) -> usize {
        self.urls.len() + self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchJob {
    pub query: String,
    pub num_results: usize,
    #[serde(flatten)]
    pub options: ScrapeOptions,
}

impl Default for SearchJob {
    fn default() -> Self {
        Self {
            query: String::new(),
            num_results: 5,
            options: ScrapeOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapJob {
    pub url: String,
    /// Keep only URLs containing this text (case-insensitive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub limit: usize,
    pub include_subdomains: bool,
    pub use_sitemap: bool,
    /// Route every request of the map (robots.txt, sitemaps, start page)
    /// through one proxy from the job's pool
    pub use_proxy: bool,
}

impl Default for MapJob {
    fn default() -> Self {
        Self {
            url: String::new(),
            search: None,
            limit: 100,
            include_subdomains: true,
            use_sitemap: true,
            use_proxy: false,
        }
    }
}

/// An immutable job request, persisted with the job as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSpec {
    Scrape(ScrapeJob),
    Crawl(CrawlJob),
    Batch(BatchJob),
    Search(SearchJob),
    Map(MapJob),
}

impl JobSpec {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Scrape(_) => JobKind::Scrape,
            Self::Crawl(_) => JobKind::Crawl,
            Self::Batch(_) => JobKind::Batch,
            Self::Search(_) => JobKind::Search,
            Self::Map(_) => JobKind::Map,
        }
    }

    /// Units of work known before the job runs
    ///
    /// Crawl, search and map jobs discover their totals while running.
    pub fn initial_total(&self) -> u32 {
        match self {
            Self::Scrape(_) => 1,
            Self::Batch(batch) => batch.len() as u32,
            Self::Crawl(_) | Self::Search(_) | Self::Map(_) => 0,
        }
    }

    /// Checks the request against the configured hard limits
    ///
    /// Concurrency values are clamped at run time rather than rejected.
    pub fn validate(&self, limits: &JobsConfig) -> Result<(), ValidationError> {
        match self {
            Self::Scrape(job) => {
                check_url(&job.url)?;
                check_scrape_options(&job.options)
            }
            Self::Crawl(job) => {
                check_url(&job.url)?;
                check_range("max_pages", job.max_pages.into(), 1, limits.max_crawl_pages.into())?;
                check_range("max_depth", job.max_depth.into(), 0, limits.max_crawl_depth.into())?;
                compile_globs(&job.include_paths)
                    .and_then(|_| compile_globs(&job.exclude_paths))
                    .map_err(|e| ValidationError::InvalidPattern(e.to_string()))?;
                check_scrape_options(&job.scrape_options)
            }
            Self::Batch(job) => {
                if job.is_empty() {
                    return Err(ValidationError::Empty("urls"));
                }
                check_range("urls", job.len() as u64, 1, limits.max_batch_size as u64)?;
                for (url, options) in job.entries() {
                    check_url(&url)?;
                    check_scrape_options(&options)?;
                }
                Ok(())
            }
            Self::Search(job) => {
                if job.query.trim().is_empty() {
                    return Err(ValidationError::Empty("query"));
                }
                if job.num_results == 0 {
                    return Err(ValidationError::OutOfRange {
                        field: "num_results",
                        value: 0,
                        min: 1,
                        max: limits.max_search_results as u64,
                    });
                }
                check_scrape_options(&job.options)
            }
            Self::Map(job) => {
                check_url(&job.url)?;
                check_range("limit", job.limit as u64, 1, 100_000)
            }
        }
    }
}

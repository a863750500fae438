//! Crawl execution loop
//!
//! Pops entries from the frontier, fetches them on a bounded set of tasks,
//! records each result as it completes and feeds discovered links back into
//! the frontier. The frontier lock is never held across a fetch.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crawler::frontier::{Frontier, FrontierEntry, FrontierRules};
use crate::extract::Format;
use crate::fetch::ProxyPool;
use crate::jobs::CrawlJob;
use crate::robots::RobotsCache;
use crate::scrape::Scraper;
use crate::storage::{JobResult, JobStore, StoreError};
use crate::normalize_url;
use crate::tasks::drain_within;
use crate::url::compile_globs;

/// Hard ceiling on parallel fetches within one crawl
pub const MAX_CRAWL_CONCURRENCY: usize = 10;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid crawl request: {0}")]
    InvalidRequest(String),
}

/// How a crawl loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Frontier drained or page cap reached
    Completed,
    Cancelled,
}

/// Result of one page task; None when robots.txt disallowed the URL
type PageTask = (FrontierEntry, Option<JobResult>);

pub struct CrawlEngine {
    scraper: Scraper,
    store: Arc<dyn JobStore>,
    robots_client: reqwest::Client,
    user_agent: String,
    max_concurrency: usize,
}

impl CrawlEngine {
    pub fn new(
        scraper: Scraper,
        store: Arc<dyn JobStore>,
        robots_client: reqwest::Client,
        user_agent: &str,
    ) -> Self {
        Self {
            scraper,
            store,
            robots_client,
            user_agent: user_agent.to_string(),
            max_concurrency: MAX_CRAWL_CONCURRENCY,
        }
    }

    /// Lowers the per-crawl concurrency ceiling
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.clamp(1, MAX_CRAWL_CONCURRENCY);
        self
    }

    /// Runs one crawl to completion, cancellation or page cap
    ///
    /// Results are appended to `job_id` in completion order. Per-page
    /// failures are recorded as failed results and never stop the crawl.
    pub async fn run(
        &self,
        job_id: Uuid,
        job: &CrawlJob,
        proxies: Option<Arc<ProxyPool>>,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        let seed = normalize_url(&job.url).map_err(|e| CrawlError::InvalidRequest(e.to_string()))?;
        let rules = FrontierRules {
            max_depth: job.max_depth,
            include: compile_globs(&job.include_paths)
                .map_err(|e| CrawlError::InvalidRequest(e.to_string()))?,
            exclude: compile_globs(&job.exclude_paths)
                .map_err(|e| CrawlError::InvalidRequest(e.to_string()))?,
            allow_external_links: job.allow_external_links,
        };

        let frontier = Arc::new(Mutex::new(Frontier::new(&seed, rules)));
        frontier.lock().await.seed(seed.as_str());

        let options = Arc::new(job.scrape_options.clone().with_format(Format::Links));
        let robots = job
            .respect_robots_txt
            .then(|| Arc::new(RobotsCache::new(self.robots_client.clone(), &self.user_agent)));

        let concurrency = job.concurrency.clamp(1, self.max_concurrency);
        let max_pages = job.max_pages as usize;
        let grace = Duration::from_millis(options.timeout);

        info!(
            "Crawl {} starting at {} (max_pages={}, max_depth={}, concurrency={})",
            job_id, seed, max_pages, job.max_depth, concurrency
        );

        let mut tasks: JoinSet<PageTask> = JoinSet::new();
        let mut dispatched = 0usize;
        let mut completed = 0u32;
        let mut total = 1u32;

        let outcome = loop {
            if cancel.is_cancelled() {
                break CrawlOutcome::Cancelled;
            }

            while tasks.len() < concurrency && dispatched < max_pages {
                let Some(entry) = frontier.lock().await.next() else {
                    break;
                };
                dispatched += 1;

                let scraper = self.scraper.clone();
                let options = Arc::clone(&options);
                let robots = robots.clone();
                let proxies = proxies.clone();
                tasks.spawn(async move {
                    if let Some(robots) = &robots {
                        if !robots.is_allowed(&entry.url).await {
                            return (entry, None);
                        }
                    }
                    let result = scraper
                        .scrape_isolated(entry.url.as_str(), &options, proxies)
                        .await;
                    (entry, Some(result))
                });
            }

            if tasks.is_empty() {
                break CrawlOutcome::Completed;
            }

            tokio::select! {
                _ = cancel.cancelled() => break CrawlOutcome::Cancelled,
                joined = tasks.join_next() => {
                    let (entry, result) = match joined {
                        Some(Ok(task)) => task,
                        Some(Err(e)) => {
                            warn!("Crawl {} page task ended abnormally: {}", job_id, e);
                            continue;
                        }
                        None => continue,
                    };

                    let Some(result) = result else {
                        debug!("robots.txt disallows {}", entry.url);
                        dispatched -= 1;
                        continue;
                    };

                    completed += 1;
                    self.store.append_result(job_id, &result).await?;

                    total = {
                        let mut frontier = frontier.lock().await;
                        if result.success {
                            if let Some(links) = result.content.as_ref().and_then(|c| c.links.as_ref()) {
                                frontier.expand(entry.depth, links);
                            }
                        }
                        (dispatched + frontier.len()).min(max_pages) as u32
                    };
                    self.store.update_job_progress(job_id, completed, total).await?;
                }
            }
        };

        if outcome == CrawlOutcome::Cancelled {
            self.drain_after_cancel(job_id, &mut tasks, grace, &mut completed, total)
                .await?;
        }

        info!(
            "Crawl {} finished as {:?} with {} pages ({} URLs discovered)",
            job_id,
            outcome,
            completed,
            frontier.lock().await.seen_count()
        );
        Ok(outcome)
    }

    /// Gives in-flight fetches one fetch timeout to finish, then aborts them
    ///
    /// Pages that finish inside the grace period are recorded like any other.
    async fn drain_after_cancel(
        &self,
        job_id: Uuid,
        tasks: &mut JoinSet<PageTask>,
        grace: Duration,
        completed: &mut u32,
        total: u32,
    ) -> Result<(), CrawlError> {
        if tasks.is_empty() {
            return Ok(());
        }

        debug!(
            "Crawl {} cancelled with {} fetches in flight",
            job_id,
            tasks.len()
        );
        for (_, result) in drain_within(tasks, grace).await {
            let Some(result) = result else { continue };
            *completed += 1;
            self.store.append_result(job_id, &result).await?;
            self.store
                .update_job_progress(job_id, *completed, total.max(*completed))
                .await?;
        }
        Ok(())
    }
}

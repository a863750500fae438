//! Per-kind job bodies
//!
//! Each runner drives one job from Running to the status it should end in.
//! Per-page problems become failed results; only errors returned from a
//! runner fail the job.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::crawler::{CrawlEngine, CrawlError, CrawlOutcome};
use crate::fetch::ProxyPool;
use crate::jobs::spec::{BatchJob, CrawlJob, JobSpec, MapJob, ScrapeJob, SearchJob};
use crate::mapper::{MapError, Mapper};
use crate::scrape::{ScrapeOptions, Scraper};
use crate::search::{SearchChain, SearchError};
use crate::state::JobStatus;
use crate::storage::{JobResult, JobStore, StoreError};
use crate::tasks::drain_within;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("Map failed: {0}")]
    Map(#[from] MapError),
}

/// Services shared by every job
pub(crate) struct Runners {
    pub store: Arc<dyn JobStore>,
    pub scraper: Scraper,
    pub crawler: CrawlEngine,
    pub mapper: Mapper,
    pub search: SearchChain,
    pub limits: JobsConfig,
}

/// Per-job execution context
pub(crate) struct JobContext {
    pub id: Uuid,
    pub cancel: CancellationToken,
    pub proxies: Option<Arc<ProxyPool>>,
}

/// One unit of fan-out work: URL, options and an optional search snippet
type FanOutItem = (String, ScrapeOptions, Option<String>);

impl Runners {
    pub async fn run(&self, ctx: &JobContext, spec: &JobSpec) -> Result<JobStatus, RunError> {
        if ctx.cancel.is_cancelled() {
            return Ok(JobStatus::Cancelled);
        }

        match spec {
            JobSpec::Scrape(job) => self.run_scrape(ctx, job).await,
            JobSpec::Crawl(job) => self.run_crawl(ctx, job).await,
            JobSpec::Batch(job) => self.run_batch(ctx, job).await,
            JobSpec::Search(job) => self.run_search(ctx, job).await,
            JobSpec::Map(job) => self.run_map(ctx, job).await,
        }
    }

    /// Scrapes one page; a cancel lets the fetch finish within its timeout
    async fn run_scrape(&self, ctx: &JobContext, job: &ScrapeJob) -> Result<JobStatus, RunError> {
        let grace = Duration::from_millis(job.options.timeout);
        let scrape = self
            .scraper
            .scrape_isolated(&job.url, &job.options, ctx.proxies.clone());
        tokio::pin!(scrape);

        let (result, status) = tokio::select! {
            result = &mut scrape => (Some(result), JobStatus::Completed),
            _ = ctx.cancel.cancelled() => {
                debug!("Job {} cancelled with its fetch in flight", ctx.id);
                (tokio::time::timeout(grace, &mut scrape).await.ok(), JobStatus::Cancelled)
            }
        };

        if let Some(result) = result {
            self.store.append_result(ctx.id, &result).await?;
            self.store.update_job_progress(ctx.id, 1, 1).await?;
        }
        Ok(status)
    }

    async fn run_crawl(&self, ctx: &JobContext, job: &CrawlJob) -> Result<JobStatus, RunError> {
        let outcome = self
            .crawler
            .run(ctx.id, job, ctx.proxies.clone(), &ctx.cancel)
            .await?;

        Ok(match outcome {
            CrawlOutcome::Completed => JobStatus::Completed,
            CrawlOutcome::Cancelled => JobStatus::Cancelled,
        })
    }

    async fn run_batch(&self, ctx: &JobContext, job: &BatchJob) -> Result<JobStatus, RunError> {
        let items: Vec<FanOutItem> = job
            .entries()
            .into_iter()
            .take(self.limits.max_batch_size)
            .map(|(url, options)| (url, options, None))
            .collect();
        let concurrency = job.concurrency.clamp(1, self.limits.max_batch_concurrency.max(1));

        self.fan_out(ctx, items, concurrency).await
    }

    async fn run_search(&self, ctx: &JobContext, job: &SearchJob) -> Result<JobStatus, RunError> {
        let limit = job.num_results.clamp(1, self.limits.max_search_results.max(1));

        let hits = tokio::select! {
            _ = ctx.cancel.cancelled() => return Ok(JobStatus::Cancelled),
            hits = self.search.search(&job.query, limit) => hits?,
        };
        info!("Search {} found {} hits for {:?}", ctx.id, hits.len(), job.query);

        let items: Vec<FanOutItem> = hits
            .into_iter()
            .take(limit)
            .map(|hit| (hit.url, job.options.clone(), hit.snippet))
            .collect();
        let concurrency = items.len().clamp(1, self.limits.max_batch_concurrency.max(1));

        self.fan_out(ctx, items, concurrency).await
    }

    async fn run_map(&self, ctx: &JobContext, job: &MapJob) -> Result<JobStatus, RunError> {
        let urls = tokio::select! {
            _ = ctx.cancel.cancelled() => return Ok(JobStatus::Cancelled),
            urls = self.mapper.map(job, ctx.proxies.as_deref()) => urls?,
        };

        let total = urls.len() as u32;
        for url in &urls {
            self.store.append_result(ctx.id, &JobResult::link(url)).await?;
        }
        self.store.update_job_progress(ctx.id, total, total).await?;
        Ok(JobStatus::Completed)
    }

    /// Scrapes `items` with at most `concurrency` fetches in flight
    ///
    /// Results are recorded in completion order. On cancellation nothing new
    /// is dispatched; in-flight fetches get the longest item timeout to
    /// finish and are recorded, then the rest are aborted.
    async fn fan_out(
        &self,
        ctx: &JobContext,
        items: Vec<FanOutItem>,
        concurrency: usize,
    ) -> Result<JobStatus, RunError> {
        let total = items.len() as u32;
        self.store.update_job_progress(ctx.id, 0, total).await?;

        let grace = Duration::from_millis(
            items.iter().map(|(_, options, _)| options.timeout).max().unwrap_or(0),
        );
        let mut pending = items.into_iter();
        let mut tasks: JoinSet<JobResult> = JoinSet::new();
        let mut completed = 0u32;

        loop {
            while tasks.len() < concurrency {
                let Some((url, options, snippet)) = pending.next() else {
                    break;
                };
                let scraper = self.scraper.clone();
                let proxies = ctx.proxies.clone();
                tasks.spawn(async move {
                    scraper
                        .scrape_isolated(&url, &options, proxies)
                        .await
                        .with_snippet(snippet)
                });
            }

            if tasks.is_empty() {
                return Ok(JobStatus::Completed);
            }

            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    debug!("Job {} cancelled with {} fetches in flight", ctx.id, tasks.len());
                    for result in drain_within(&mut tasks, grace).await {
                        completed += 1;
                        self.store.append_result(ctx.id, &result).await?;
                        self.store.update_job_progress(ctx.id, completed, total).await?;
                    }
                    return Ok(JobStatus::Cancelled);
                }
                joined = tasks.join_next() => {
                    let result = match joined {
                        Some(Ok(result)) => result,
                        Some(Err(e)) => {
                            warn!("Job {} scrape task ended abnormally: {}", ctx.id, e);
                            continue;
                        }
                        None => continue,
                    };

                    completed += 1;
                    self.store.append_result(ctx.id, &result).await?;
                    self.store.update_job_progress(ctx.id, completed, total).await?;
                }
            }
        }
    }
}

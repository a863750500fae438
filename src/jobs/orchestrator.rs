//! Job admission, queuing and execution
//!
//! Every job kind has its own bounded queue, dispatcher task and worker
//! semaphore, so a burst of one kind cannot starve another. Job records live
//! in the [`JobStore`]; the orchestrator only keeps cancellation tokens and
//! per-user proxy pools in memory.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::ContentCache;
use crate::config::Config;
use crate::crawler::CrawlEngine;
use crate::fetch::{BrowserBackend, BrowserPool, FetchEscalator, ProxyPool, RemoteBrowserBackend};
use crate::jobs::runners::{JobContext, Runners};
use crate::jobs::spec::{JobSpec, ValidationError};
use crate::mapper::Mapper;
use crate::ratelimit::RateLimiter;
use crate::robots::robots_client;
use crate::scrape::Scraper;
use crate::search::SearchChain;
use crate::state::{JobKind, JobStatus};
use crate::storage::{open_store, Job, JobResult, JobStore, StoreError};
use crate::tasks::AbortOnDrop;
use crate::{ConfigError, HarvestError};

/// Upper bound on the time between cache purges
const CACHE_PURGE_SECS: u64 = 60;

/// Why a job request was not admitted
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid job request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Rate limit exceeded for {user} ({kind})")]
    RateLimited { user: String, kind: JobKind },

    #[error("Failed to record job: {0}")]
    Store(#[from] StoreError),

    #[error("Orchestrator is shutting down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum CancelError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job {id} already finished as {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Inner {
    store: Arc<dyn JobStore>,
    runners: Runners,
    limiter: RateLimiter,
    tokens: DashMap<Uuid, CancellationToken>,
    user_proxies: DashMap<String, Arc<ProxyPool>>,
    default_proxies: Option<Arc<ProxyPool>>,
    shutdown: CancellationToken,
}

impl Inner {
    fn token_for(&self, id: Uuid) -> CancellationToken {
        self.tokens.entry(id).or_default().clone()
    }

    fn proxies_for(&self, user: &str) -> Option<Arc<ProxyPool>> {
        self.user_proxies
            .get(user)
            .map(|pool| Arc::clone(pool.value()))
            .or_else(|| self.default_proxies.clone())
    }

    /// Runs one dequeued job and records its terminal state
    async fn execute(self: Arc<Self>, id: Uuid) {
        let job = match self.store.get_job(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Dequeued unknown job {}", id);
                return;
            }
            Err(e) => {
                error!("Failed to load job {}: {}", id, e);
                return;
            }
        };

        if job.status.is_terminal() {
            debug!("Skipping job {} already {}", id, job.status);
            self.tokens.remove(&id);
            return;
        }

        if let Err(e) = self.store.mark_running(id).await {
            warn!("Could not start job {}: {}", id, e);
            return;
        }
        info!("Job {} ({}) running", id, job.kind);

        let ctx = JobContext {
            id,
            cancel: self.token_for(id),
            proxies: self.proxies_for(&job.user_id),
        };

        // The body runs on its own task so a panic fails only this job
        let inner = Arc::clone(&self);
        let spec = job.spec.clone();
        let handle = tokio::spawn(async move { inner.runners.run(&ctx, &spec).await });
        let _guard = AbortOnDrop(handle.abort_handle());

        let (status, error) = match handle.await {
            Ok(Ok(status)) => (status, None),
            Ok(Err(e)) => (JobStatus::Failed, Some(e.to_string())),
            Err(e) if e.is_panic() => (JobStatus::Failed, Some(format!("job task panicked: {}", e))),
            Err(e) => (JobStatus::Failed, Some(e.to_string())),
        };

        match self.store.finalize_job(id, status, error.as_deref()).await {
            Ok(()) => match &error {
                Some(e) => warn!("Job {} failed: {}", id, e),
                None => info!("Job {} {}", id, status),
            },
            Err(e) => debug!("Job {} was finalized elsewhere: {}", id, e),
        }
        self.tokens.remove(&id);
    }
}

/// Admits, queues, runs and tracks jobs
pub struct JobOrchestrator {
    inner: Arc<Inner>,
    queues: HashMap<JobKind, mpsc::Sender<Uuid>>,
    /// Per-kind dispatchers plus the cache purger
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
    poll_interval: Duration,
    jobs: crate::config::JobsConfig,
}

impl JobOrchestrator {
    /// Builds an orchestrator from configuration alone
    ///
    /// Opens the configured store and enables browser strategies when a
    /// rendering service is configured. No search providers are attached.
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let store = open_store(config.storage.database_path.as_deref().map(std::path::Path::new))?;

        let backend: Option<Arc<dyn BrowserBackend>> = match &config.browser.service_url {
            Some(url) => Some(Arc::new(RemoteBrowserBackend::new(url)?)),
            None => None,
        };
        let pool = BrowserPool::new(config.browser.pool_size);
        let escalator = Arc::new(FetchEscalator::from_config(&config.fetch, backend, &pool)?);

        Self::new(config, store, escalator, SearchChain::default())
    }

    /// Builds an orchestrator around injected services
    ///
    /// Must be called inside a Tokio runtime: the per-kind dispatchers are
    /// spawned immediately.
    pub fn new(
        config: &Config,
        store: Arc<dyn JobStore>,
        escalator: Arc<FetchEscalator>,
        search: SearchChain,
    ) -> Result<Self, HarvestError> {
        let mut scraper =
            Scraper::new(Arc::clone(&escalator)).with_user_agent(&config.fetch.user_agent);
        let cache = config.cache.enabled.then(|| Arc::new(ContentCache::new()));
        if let Some(cache) = &cache {
            scraper = scraper.with_cache(
                Arc::clone(cache),
                Duration::from_secs(config.cache.ttl_seconds),
            );
        }

        let client = robots_client(
            &config.fetch.user_agent,
            Duration::from_millis(config.fetch.robots_timeout_ms),
        )?;
        let crawler = CrawlEngine::new(
            scraper.clone(),
            Arc::clone(&store),
            client,
            &config.fetch.user_agent,
        )
        .with_max_concurrency(config.jobs.max_crawl_concurrency);
        let mapper = Mapper::new(
            escalator,
            &config.fetch.user_agent,
            Duration::from_millis(config.fetch.robots_timeout_ms),
        )?;

        let default_proxies = if config.proxy.urls.is_empty() {
            None
        } else {
            Some(Arc::new(ProxyPool::from_urls(&config.proxy.urls)?))
        };

        let inner = Arc::new(Inner {
            store: Arc::clone(&store),
            runners: Runners {
                store,
                scraper,
                crawler,
                mapper,
                search,
                limits: config.jobs.clone(),
            },
            limiter: RateLimiter::new(config.rate_limits.clone()),
            tokens: DashMap::new(),
            user_proxies: DashMap::new(),
            default_proxies,
            shutdown: CancellationToken::new(),
        });

        let mut queues = HashMap::new();
        let mut dispatchers = Vec::new();
        if let Some(cache) = &cache {
            let every = Duration::from_secs(config.cache.ttl_seconds.clamp(1, CACHE_PURGE_SECS));
            dispatchers.push(cache.spawn_purger(every, inner.shutdown.clone()));
        }
        for kind in JobKind::all() {
            let (tx, rx) = mpsc::channel(config.jobs.queue_capacity.max(1));
            let workers = config.jobs.workers_for(kind).max(1);
            dispatchers.push(tokio::spawn(dispatch(Arc::clone(&inner), kind, rx, workers)));
            queues.insert(kind, tx);
        }

        Ok(Self {
            inner,
            queues,
            dispatchers: Mutex::new(dispatchers),
            poll_interval: Duration::from_millis(config.jobs.poll_interval_ms.max(1)),
            jobs: config.jobs.clone(),
        })
    }

    /// Routes a user's proxied requests through `urls` instead of the default pool
    pub fn set_user_proxies(&self, user: &str, urls: &[String]) -> Result<(), ConfigError> {
        let pool = ProxyPool::from_urls(urls)?;
        if pool.is_empty() {
            self.inner.user_proxies.remove(user);
        } else {
            self.inner
                .user_proxies
                .insert(user.to_string(), Arc::new(pool));
        }
        Ok(())
    }

    /// Validates, rate-limits, records and enqueues a job
    pub async fn submit(&self, user: &str, spec: JobSpec) -> Result<Uuid, SubmitError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SubmitError::Closed);
        }

        spec.validate(&self.jobs)?;

        let kind = spec.kind();
        if !self.inner.limiter.allow(user, kind) {
            return Err(SubmitError::RateLimited {
                user: user.to_string(),
                kind,
            });
        }

        let job = Job::new(user, spec);
        self.inner.store.create_job(&job).await?;
        self.inner.token_for(job.id);
        info!("Job {} ({}) submitted by {}", job.id, kind, user);

        self.enqueue(kind, job.id).await?;
        Ok(job.id)
    }

    async fn enqueue(&self, kind: JobKind, id: Uuid) -> Result<(), SubmitError> {
        let queue = self.queues.get(&kind).ok_or(SubmitError::Closed)?;
        queue.send(id).await.map_err(|_| SubmitError::Closed)
    }

    pub async fn status(&self, id: Uuid) -> Result<Job, HarvestError> {
        self.inner
            .store
            .get_job(id)
            .await?
            .ok_or(HarvestError::JobNotFound(id))
    }

    /// Results recorded so far, in completion order
    pub async fn results(&self, id: Uuid) -> Result<Vec<JobResult>, HarvestError> {
        match self.inner.store.get_results(id).await {
            Err(StoreError::JobNotFound(id)) => Err(HarvestError::JobNotFound(id)),
            other => Ok(other?),
        }
    }

    /// Requests cancellation
    ///
    /// A queued job is finalized as Cancelled at once. A running job stops at
    /// its next cancellation point and keeps the results it already has.
    pub async fn cancel(&self, id: Uuid) -> Result<(), CancelError> {
        let job = self
            .inner
            .store
            .get_job(id)
            .await?
            .ok_or(CancelError::NotFound(id))?;

        if job.status.is_terminal() {
            return Err(CancelError::AlreadyTerminal {
                id,
                status: job.status,
            });
        }

        self.inner.token_for(id).cancel();
        info!("Cancellation requested for job {}", id);

        if job.status == JobStatus::Pending {
            match self
                .inner
                .store
                .finalize_job(id, JobStatus::Cancelled, None)
                .await
            {
                Ok(()) | Err(StoreError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Polls until the job reaches a terminal state
    pub async fn wait(&self, id: Uuid) -> Result<Job, HarvestError> {
        loop {
            let job = self.status(id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Re-enqueues every unfinished job found in the store
    ///
    /// Jobs that were running when the previous process stopped lose their
    /// partial results and run again from scratch. Returns how many jobs
    /// were re-enqueued.
    pub async fn recover(&self) -> Result<usize, HarvestError> {
        let unfinished = self.inner.store.list_unfinished().await?;
        let mut recovered = 0;

        for job in unfinished {
            if self.inner.tokens.contains_key(&job.id) {
                continue;
            }
            if job.status == JobStatus::Running {
                self.inner.store.reset_results(job.id).await?;
            }
            self.inner.token_for(job.id);
            self.enqueue(job.kind, job.id).await?;
            recovered += 1;
        }

        if recovered > 0 {
            info!("Recovered {} unfinished jobs", recovered);
        }
        Ok(recovered)
    }

    /// Stops all dispatchers and the cache purger
    ///
    /// Running jobs are aborted without being finalized, so they stay
    /// unfinished in the store and [`recover`](Self::recover) picks them up
    /// on the next start.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let handles: Vec<_> = self.dispatchers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Dispatcher ended abnormally: {}", e);
            }
        }
        info!("Orchestrator shut down");
    }
}

/// Pulls job ids for one kind and runs them under that kind's worker limit
async fn dispatch(inner: Arc<Inner>, kind: JobKind, mut rx: mpsc::Receiver<Uuid>, workers: usize) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();
    debug!("Dispatcher for {} jobs started with {} workers", kind, workers);

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            Some(done) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = done {
                    error!("{} job task ended abnormally: {}", kind, e);
                }
            }
            next = rx.recv() => {
                let Some(id) = next else { break };

                let permit = tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let inner = Arc::clone(&inner);
                running.spawn(async move {
                    let _permit = permit;
                    inner.execute(id).await;
                });
            }
        }
    }

    running.abort_all();
    while running.join_next().await.is_some() {}
    debug!("Dispatcher for {} jobs stopped", kind);
}

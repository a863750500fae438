use serde::{Deserialize, Serialize};

use crate::state::JobKind;

/// Main configuration structure for Harvest Engine
///
/// Every section is optional; a missing section takes its defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Fetch escalation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    /// Usable content at or above this size stops escalation
    pub sufficient_bytes: usize,

    /// Best content at or above this size skips the aggressive browser
    pub partial_bytes: usize,

    /// Per-strategy timeout (milliseconds)
    pub timeout_ms: u64,

    /// Visible text shorter than this is checked for challenge phrases
    pub blocked_text_limit: usize,

    /// Domains on which the generic HTTP client is never tried
    pub hard_domains: Vec<String>,

    /// User agent of the generic HTTP client
    pub user_agent: String,

    /// Timeout for robots.txt and sitemap fetches (milliseconds)
    pub robots_timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            sufficient_bytes: 5000,
            partial_bytes: 2000,
            timeout_ms: 30_000,
            blocked_text_limit: 1500,
            hard_domains: default_hard_domains(),
            user_agent: "Mozilla/5.0 (compatible; HarvestEngine/0.1)".to_string(),
            robots_timeout_ms: 10_000,
        }
    }
}

fn default_hard_domains() -> Vec<String> {
    [
        "amazon.com", "amazon.co.uk", "amazon.de", "amazon.fr", "amazon.co.jp",
        "amazon.in", "amazon.ca", "amazon.com.au", "amazon.es", "amazon.it",
        "google.com", "facebook.com", "instagram.com", "twitter.com", "x.com",
        "linkedin.com", "zillow.com", "indeed.com", "glassdoor.com",
        "walmart.com", "target.com", "bestbuy.com", "ebay.com",
        "cloudflare.com", "netflix.com", "spotify.com",
        "ticketmaster.com", "stubhub.com", "nike.com", "adidas.com",
        "booking.com", "airbnb.com", "expedia.com", "craigslist.org", "yelp.com",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BrowserConfig {
    /// Rendering service endpoint; browser strategies are disabled without it
    pub service_url: Option<String>,

    /// Maximum concurrent renders across all jobs
    pub pool_size: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            pool_size: 4,
        }
    }
}

/// Content cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Lifetime of a cached page (seconds)
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
        }
    }
}

/// Requests per minute per user, by operation class
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    pub scrape: u32,
    pub crawl: u32,
    pub batch: u32,
    pub search: u32,
    pub map: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            scrape: 100,
            crawl: 20,
            batch: 20,
            search: 30,
            map: 50,
        }
    }
}

impl RateLimitConfig {
    /// Requests per minute allowed for one job kind
    pub fn limit_for(&self, kind: JobKind) -> u32 {
        match kind {
            JobKind::Scrape => self.scrape,
            JobKind::Crawl => self.crawl,
            JobKind::Batch => self.batch,
            JobKind::Search => self.search,
            JobKind::Map => self.map,
        }
    }
}

/// Job execution limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct JobsConfig {
    pub scrape_workers: usize,
    pub crawl_workers: usize,
    pub batch_workers: usize,
    pub search_workers: usize,
    pub map_workers: usize,

    /// Capacity of each per-kind queue
    pub queue_capacity: usize,

    pub max_batch_size: usize,
    pub max_batch_concurrency: usize,
    pub max_search_results: usize,
    pub max_crawl_pages: u32,
    pub max_crawl_depth: u32,
    pub max_crawl_concurrency: usize,

    /// Interval between status polls in `wait` (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            scrape_workers: 8,
            crawl_workers: 2,
            batch_workers: 2,
            search_workers: 2,
            map_workers: 2,
            queue_capacity: 1024,
            max_batch_size: 100,
            max_batch_concurrency: 20,
            max_search_results: 10,
            max_crawl_pages: 1000,
            max_crawl_depth: 10,
            max_crawl_concurrency: 10,
            poll_interval_ms: 200,
        }
    }
}

impl JobsConfig {
    pub fn workers_for(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::Scrape => self.scrape_workers,
            JobKind::Crawl => self.crawl_workers,
            JobKind::Batch => self.batch_workers,
            JobKind::Search => self.search_workers,
            JobKind::Map => self.map_workers,
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    /// Path to the SQLite database; jobs are kept in memory when unset
    pub database_path: Option<String>,
}

/// Outbound proxy configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProxyConfig {
    /// Proxy URLs (`http://`, `https://`, `socks5://`), optionally with credentials
    pub urls: Vec<String>,
}

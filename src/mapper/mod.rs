//! Site mapping
//!
//! Lists a site's URLs without fetching their content: sitemap entries
//! first, then links found on the start page, filtered to the same site.

mod sitemap;

pub use sitemap::{discover_sitemap_urls, parse_sitemap, robots_sitemaps, Sitemap};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::extract::extract_links_from_html;
use crate::fetch::{build_http_client, FetchEscalator, FetchOptions, ProxyPool};
use crate::jobs::MapJob;
use crate::url::{is_same_site, origin_of};
use crate::{normalize_url, UrlError};

#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    Url(#[from] UrlError),

    #[error("Cannot route map through proxy {proxy}: {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },
}

pub struct Mapper {
    client: reqwest::Client,
    escalator: Arc<FetchEscalator>,
    user_agent: String,
    timeout: Duration,
}

impl Mapper {
    /// Sitemaps and robots.txt are read with a plain client built from
    /// `user_agent` and `timeout`; the start page goes through `escalator`
    pub fn new(
        escalator: Arc<FetchEscalator>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(timeout, false, Some(user_agent), None)?,
            escalator,
            user_agent: user_agent.to_string(),
            timeout,
        })
    }

    /// Lists the site's URLs
    ///
    /// With `use_proxy` set and a pool given, one proxy is picked and every
    /// request of the map goes through it. Otherwise nothing is proxied.
    pub async fn map(&self, job: &MapJob, proxies: Option<&ProxyPool>) -> Result<Vec<String>, MapError> {
        let start = normalize_url(&job.url)?;
        let base_host = start.host_str().ok_or(UrlError::MissingDomain)?.to_string();

        let proxy = if job.use_proxy {
            proxies.and_then(ProxyPool::pick).cloned()
        } else {
            None
        };
        if let Some(proxy) = &proxy {
            debug!("Mapping {} through proxy {}", start, proxy.masked());
        }

        let mut candidates = Vec::new();
        if job.use_sitemap {
            let client = match &proxy {
                Some(proxy) => build_http_client(self.timeout, false, Some(&self.user_agent), Some(proxy))
                    .map_err(|source| MapError::Proxy {
                        proxy: proxy.masked(),
                        source,
                    })?,
                None => self.client.clone(),
            };
            candidates.extend(discover_sitemap_urls(&client, &origin_of(&start)).await);
        }

        let options = FetchOptions {
            use_proxy: proxy.is_some(),
            ..FetchOptions::default()
        };
        let pinned = proxy.map(|proxy| ProxyPool::new(vec![proxy]));
        match self.escalator.fetch(start.as_str(), &options, pinned.as_ref()).await {
            Ok(outcome) => {
                let base = url::Url::parse(&outcome.page.url).unwrap_or_else(|_| start.clone());
                candidates.push(start.to_string());
                candidates.extend(extract_links_from_html(&outcome.page.body, &base));
            }
            Err(e) => debug!("Start page unavailable for map of {}: {}", start, e),
        }

        let urls = filter_candidates(candidates, &base_host, job);
        info!("Mapped {} URLs for {}", urls.len(), start);
        Ok(urls)
    }
}

/// Normalizes, deduplicates and filters candidate URLs, keeping first-seen order
pub fn filter_candidates(candidates: Vec<String>, base_host: &str, job: &MapJob) -> Vec<String> {
    let needle = job.search.as_deref().map(str::to_lowercase);
    let mut seen = HashSet::new();

    candidates
        .into_iter()
        .filter_map(|candidate| normalize_url(&candidate).ok())
        .filter(|url| {
            url.host_str()
                .map_or(false, |host| is_same_site(base_host, host, job.include_subdomains))
        })
        .map(|url| url.to_string())
        .filter(|url| {
            needle
                .as_deref()
                .map_or(true, |needle| url.to_lowercase().contains(needle))
        })
        .filter(|url| seen.insert(url.clone()))
        .take(job.limit)
        .collect()
}

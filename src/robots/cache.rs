//! Per-crawl robots.txt cache
//!
//! Each origin's robots.txt is fetched at most once per cache, even when
//! several workers ask for it at the same time.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::robots::{fetch_robots, RobotsRules};
use crate::url::origin_of;

pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    entries: DashMap<String, Arc<OnceCell<RobotsRules>>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, user_agent: &str) -> Self {
        Self {
            client,
            user_agent: user_agent.to_string(),
            entries: DashMap::new(),
        }
    }

    /// Returns the rules for `url`'s origin, fetching them on first use
    pub async fn rules_for(&self, url: &Url) -> RobotsRules {
        let origin = origin_of(url);
        let cell = self
            .entries
            .entry(origin.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_init(|| async {
            debug!("Fetching robots.txt for {}", origin);
            fetch_robots(&self.client, &origin).await
        })
        .await
        .clone()
    }

    /// Checks `url` against its origin's robots.txt; unreachable files allow all
    pub async fn is_allowed(&self, url: &Url) -> bool {
        self.rules_for(url)
            .await
            .is_allowed(url.as_str(), &self.user_agent)
    }

    /// Number of origins seen so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Process-wide content cache
//!
//! Entries are keyed by a fingerprint of the normalized URL and the
//! requested formats. Expiry is TTL only; expired entries read as absent and
//! are dropped lazily on read or by the background purger.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::extract::{Format, PageContent};

/// Computes the cache key for a URL and a set of formats
///
/// The format list is sorted and deduplicated first, so the order in which
/// a caller lists formats does not matter.
pub fn fingerprint(normalized_url: &str, formats: &[Format]) -> String {
    let mut names: Vec<&str> = formats.iter().map(Format::as_str).collect();
    names.sort_unstable();
    names.dedup();

    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    hasher.update(b":");
    hasher.update(names.join(",").as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    content: PageContent,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct ContentCache {
    entries: DashMap<String, CacheEntry>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached content, or None when missing or expired
    pub fn get(&self, fingerprint: &str) -> Option<PageContent> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(fingerprint) {
            if entry.expires_at > now {
                return Some(entry.content.clone());
            }
        } else {
            return None;
        }

        self.entries
            .remove_if(fingerprint, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn put(&self, fingerprint: String, content: PageContent, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        self.entries.insert(
            fingerprint,
            CacheEntry {
                content,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drops every expired entry and returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Purges expired entries every `every` until `stop` is cancelled
    pub fn spawn_purger(self: &Arc<Self>, every: Duration, stop: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!("Purged {} expired cache entries, {} left", removed, cache.len());
                        }
                    }
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

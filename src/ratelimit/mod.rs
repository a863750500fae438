//! Per-user admission control
//!
//! A token bucket per `(user, JobKind)`. Buckets start full, refill in
//! proportion to elapsed time and never exceed their capacity. An empty
//! bucket rejects immediately; callers are never made to wait.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::state::JobKind;

const REFILL_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, capacity: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let gained = capacity * elapsed.as_secs_f64() / REFILL_WINDOW.as_secs_f64();
        self.tokens = (self.tokens + gained).min(capacity);
        self.last_refill = now;
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    limits: RateLimitConfig,
    buckets: DashMap<(String, JobKind), Bucket>,
}

impl RateLimiter {
    pub fn new(limits: RateLimitConfig) -> Self {
        Self {
            limits,
            buckets: DashMap::new(),
        }
    }

    /// Takes one token from the user's bucket for `kind`
    ///
    /// Returns false when the bucket is empty.
    pub fn allow(&self, user: &str, kind: JobKind) -> bool {
        let capacity = f64::from(self.limits.limit_for(kind));
        let now = Instant::now();

        let mut bucket = self
            .buckets
            .entry((user.to_string(), kind))
            .or_insert_with(|| Bucket::full(capacity, now));

        bucket.refill(capacity, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            debug!("Rate limit reached for user {} ({})", user, kind);
            false
        }
    }

    /// Tokens currently available, without consuming any
    pub fn remaining(&self, user: &str, kind: JobKind) -> u32 {
        let capacity = f64::from(self.limits.limit_for(kind));
        let now = Instant::now();

        match self.buckets.get(&(user.to_string(), kind)) {
            Some(bucket) => {
                let mut copy = *bucket;
                copy.refill(capacity, now);
                copy.tokens.floor() as u32
            }
            None => self.limits.limit_for(kind),
        }
    }
}

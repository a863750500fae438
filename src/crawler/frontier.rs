//! Breadth-first crawl frontier
//!
//! A FIFO queue of `(url, depth)` entries plus the set of every URL ever
//! enqueued. A normalized URL is enqueued at most once per crawl and keeps
//! the depth at which it was first seen.

use std::collections::{HashSet, VecDeque};
use tracing::trace;
use url::Url;

use crate::url::{has_non_page_extension, is_same_site, normalize_url, PathGlob};

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
}

/// Filters applied to discovered links
#[derive(Debug, Clone, Default)]
pub struct FrontierRules {
    pub max_depth: u32,
    /// When non-empty, a link's path must match one of these
    pub include: Vec<PathGlob>,
    pub exclude: Vec<PathGlob>,
    pub allow_external_links: bool,
}

/// Why a discovered link was not enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Invalid,
    Seen,
    TooDeep,
    Excluded,
    NotIncluded,
    External,
    NonPage,
}

#[derive(Debug)]
pub struct Frontier {
    /// Host of the seed, for the same-domain rule
    base_host: String,
    rules: FrontierRules,
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
}

impl Frontier {
    pub fn new(seed: &Url, rules: FrontierRules) -> Self {
        Self {
            base_host: seed.host_str().unwrap_or_default().to_ascii_lowercase(),
            rules,
            queue: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Enqueues the seed at depth 0
    ///
    /// The seed is not subject to path filters. Returns false when it was
    /// already seen or does not normalize.
    pub fn seed(&mut self, url: &str) -> bool {
        let Ok(normalized) = normalize_url(url) else {
            return false;
        };

        if !self.seen.insert(normalized.as_str().to_string()) {
            return false;
        }

        self.queue.push_back(FrontierEntry {
            url: normalized,
            depth: 0,
        });
        true
    }

    /// Enqueues the acceptable links found on a page at `parent_depth`
    ///
    /// Returns the number of links added.
    pub fn expand(&mut self, parent_depth: u32, links: &[String]) -> usize {
        let depth = parent_depth + 1;
        let mut added = 0;

        for link in links {
            match self.admit(link, depth) {
                Ok(url) => {
                    self.seen.insert(url.as_str().to_string());
                    self.queue.push_back(FrontierEntry { url, depth });
                    added += 1;
                }
                Err(reason) => trace!("Rejected {} ({:?})", link, reason),
            }
        }

        added
    }

    fn admit(&self, link: &str, depth: u32) -> Result<Url, Rejection> {
        let url = normalize_url(link).map_err(|_| Rejection::Invalid)?;

        if self.seen.contains(url.as_str()) {
            return Err(Rejection::Seen);
        }
        if depth > self.rules.max_depth {
            return Err(Rejection::TooDeep);
        }

        let path = url.path();
        if self.rules.exclude.iter().any(|glob| glob.matches(path)) {
            return Err(Rejection::Excluded);
        }
        if !self.rules.include.is_empty() && !self.rules.include.iter().any(|g| g.matches(path)) {
            return Err(Rejection::NotIncluded);
        }

        if !self.rules.allow_external_links {
            let host = url.host_str().unwrap_or_default();
            if !is_same_site(&self.base_host, host, false) {
                return Err(Rejection::External);
            }
        }

        if has_non_page_extension(path) {
            return Err(Rejection::NonPage);
        }

        Ok(url)
    }

    /// Pops the oldest entry
    pub fn next(&mut self) -> Option<FrontierEntry> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct URLs ever enqueued
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

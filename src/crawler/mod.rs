//! Crawler module
//!
//! This module contains the breadth-first crawl:
//! - `frontier`: the deduplicating FIFO of URLs to visit
//! - `engine`: the bounded-concurrency fetch loop that drives it

mod engine;
mod frontier;

pub use engine::{CrawlEngine, CrawlError, CrawlOutcome, MAX_CRAWL_CONCURRENCY};
pub use frontier::{Frontier, FrontierEntry, FrontierRules, Rejection};

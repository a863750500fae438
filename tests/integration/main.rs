//! Integration tests for Harvest Engine
//!
//! HTTP-facing tests run against wiremock servers; escalation properties
//! are driven by scripted strategies that record how they were called.

mod common;
mod crawl;
mod documents;
mod escalation;
mod jobs;
mod store;

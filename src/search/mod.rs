//! Web search collaborators
//!
//! Search engines sit behind [`SearchProvider`]. A [`SearchChain`] asks each
//! provider in turn and returns the first non-empty answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Search provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("No search provider configured")]
    NoProviders,
}

/// One organic search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Returns at most `limit` hits for `query`
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// Providers tried in order until one returns hits
#[derive(Clone, Default)]
pub struct SearchChain {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl SearchChain {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Runs the query against each provider until one returns hits
    ///
    /// An empty answer from every provider is not an error. When every
    /// provider failed, the last failure is returned.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        if self.providers.is_empty() {
            return Err(SearchError::NoProviders);
        }

        let mut last_error = None;
        let mut any_answered = false;

        for provider in &self.providers {
            match provider.search(query, limit).await {
                Ok(hits) if !hits.is_empty() => {
                    debug!("{} returned {} hits for {:?}", provider.name(), hits.len(), query);
                    return Ok(hits.into_iter().take(limit).collect());
                }
                Ok(_) => {
                    any_answered = true;
                    debug!("{} returned no hits for {:?}", provider.name(), query);
                }
                Err(e) => {
                    warn!("{}", e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !any_answered => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}

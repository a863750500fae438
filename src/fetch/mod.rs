//! Page fetching
//!
//! This module contains the strategies that obtain a page and the
//! escalator that chains them:
//! - `http`: impersonated and generic HTTP clients
//! - `browser`: headless renders behind the `BrowserBackend` trait
//! - `pool`: the shared limit on concurrent renders
//! - `proxy`: proxy parsing and random selection
//! - `escalator`: the ordered strategy list and its policy

mod browser;
mod escalator;
mod http;
mod pool;
mod proxy;
mod strategy;
mod types;

use std::sync::Arc;
use std::time::Duration;

pub use browser::{
    BrowserBackend, BrowserEngine, BrowserStrategy, RemoteBrowserBackend, RenderMode, RenderProxy,
    RenderRequest, RenderedPage,
};
pub use escalator::{
    looks_blocked, visible_text, EscalationContext, EscalationPolicy, FetchEscalator,
    FetchOutcome, Step,
};
pub use http::{build_http_client, classify_error, GenericClient, ImpersonatedClient};
pub use pool::{BrowserLease, BrowserPool};
pub use proxy::{Proxy, ProxyPool};
pub use strategy::{FetchStrategy, StrategyRequest};
pub use types::{BrowserAction, FetchOptions, RawPage, ScrollDirection, StrategyKind};

use crate::config::FetchConfig;

/// Builds the standard strategy chain
///
/// The HTTP strategies are always present. The three browser strategies are
/// added only when a backend is available.
pub fn build_strategies(
    config: &FetchConfig,
    backend: Option<Arc<dyn BrowserBackend>>,
    pool: &BrowserPool,
) -> Result<Vec<Arc<dyn FetchStrategy>>, reqwest::Error> {
    let timeout = Duration::from_millis(config.timeout_ms);

    let mut strategies: Vec<Arc<dyn FetchStrategy>> = vec![
        Arc::new(ImpersonatedClient::new(timeout)?),
        Arc::new(GenericClient::new(timeout, &config.user_agent)?),
    ];

    if let Some(backend) = backend {
        strategies.push(Arc::new(BrowserStrategy::standard(
            Arc::clone(&backend),
            pool.clone(),
        )));
        strategies.push(Arc::new(BrowserStrategy::alt_engine(
            Arc::clone(&backend),
            pool.clone(),
        )));
        strategies.push(Arc::new(BrowserStrategy::aggressive(backend, pool.clone())));
    }

    Ok(strategies)
}

impl FetchEscalator {
    /// Builds an escalator with the standard chain and configured policy
    pub fn from_config(
        config: &FetchConfig,
        backend: Option<Arc<dyn BrowserBackend>>,
        pool: &BrowserPool,
    ) -> Result<Self, reqwest::Error> {
        let strategies = build_strategies(config, backend, pool)?;
        Ok(Self::new(strategies, EscalationPolicy::from_config(config)))
    }
}

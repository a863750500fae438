use async_trait::async_trait;

use crate::fetch::proxy::Proxy;
use crate::fetch::types::{FetchOptions, RawPage, StrategyKind};
use crate::FetchError;

/// Everything a strategy needs for one attempt
#[derive(Debug, Clone, Copy)]
pub struct StrategyRequest<'a> {
    pub url: &'a str,
    pub options: &'a FetchOptions,
    /// The proxy chosen for the whole escalation, if any
    pub proxy: Option<&'a Proxy>,
}

/// One way of obtaining a page
///
/// A strategy returns `Ok` with whatever the server sent, including error
/// statuses and challenge pages; judging the content is the escalator's job.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn fetch(&self, request: StrategyRequest<'_>) -> Result<RawPage, FetchError>;
}

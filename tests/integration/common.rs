//! Shared fixtures

use async_trait::async_trait;
use harvest_engine::config::FetchConfig;
use harvest_engine::fetch::{
    EscalationPolicy, FetchEscalator, FetchStrategy, GenericClient, RawPage, StrategyKind,
    StrategyRequest,
};
use harvest_engine::jobs::JobSpec;
use harvest_engine::storage::{Job, JobStore};
use harvest_engine::FetchError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const TEST_AGENT: &str = "HarvestTest/1.0";

/// An HTML page with a title, some body text and the given links
pub fn page(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><main><h1>{}</h1><p>Regular page text for {}.</p>{}</main></body></html>",
        title, title, title, anchors
    )
}

/// A page with roughly `bytes` of ordinary article text
pub fn article(bytes: usize) -> String {
    let paragraph = "<p>The quick brown fox jumps over the lazy dog.</p>";
    format!(
        "<html><head><title>Article</title></head><body><main>{}</main></body></html>",
        paragraph.repeat(bytes / paragraph.len() + 1)
    )
}

pub fn challenge() -> String {
    "<html><head><title>Just a moment...</title></head><body>Checking your browser before accessing the site.</body></html>".to_string()
}

/// An escalator holding only the plain HTTP client
pub fn http_escalator() -> Arc<FetchEscalator> {
    let client = GenericClient::new(Duration::from_secs(5), TEST_AGENT).unwrap();
    Arc::new(FetchEscalator::new(
        vec![Arc::new(client)],
        EscalationPolicy::from_config(&FetchConfig::default()),
    ))
}

pub fn policy() -> EscalationPolicy {
    EscalationPolicy::from_config(&FetchConfig::default())
}

type Responder = Box<dyn Fn(&str) -> Result<RawPage, FetchError> + Send + Sync>;

/// A strategy that answers from a closure and records every call
pub struct ScriptedStrategy {
    kind: StrategyKind,
    respond: Responder,
    calls: AtomicUsize,
    proxies: Mutex<Vec<Option<String>>>,
}

impl ScriptedStrategy {
    pub fn new(
        kind: StrategyKind,
        respond: impl Fn(&str) -> Result<RawPage, FetchError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            proxies: Mutex::new(Vec::new()),
        })
    }

    /// Always returns `body` with status 200
    pub fn serving(kind: StrategyKind, body: String) -> Arc<Self> {
        Self::new(kind, move |url| Ok(ok_page(url, &body)))
    }

    pub fn failing(kind: StrategyKind) -> Arc<Self> {
        Self::new(kind, |url| {
            Err(FetchError::Network {
                url: url.to_string(),
                message: "connection reset".to_string(),
            })
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The proxy server each call was routed through
    pub fn proxies_seen(&self) -> Vec<Option<String>> {
        self.proxies.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchStrategy for ScriptedStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn fetch(&self, request: StrategyRequest<'_>) -> Result<RawPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.proxies
            .lock()
            .unwrap()
            .push(request.proxy.map(|p| p.server()));
        (self.respond)(request.url)
    }
}

pub fn ok_page(url: &str, body: &str) -> RawPage {
    RawPage {
        url: url.to_string(),
        status: 200,
        body: body.to_string(),
        ..Default::default()
    }
}

/// Stores a job and moves it to Running, as the orchestrator would
pub async fn running_job(store: &Arc<dyn JobStore>, spec: JobSpec) -> Uuid {
    let job = Job::new("tester", spec);
    store.create_job(&job).await.unwrap();
    store.mark_running(job.id).await.unwrap();
    job.id
}

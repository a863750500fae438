//! Headless-browser strategies
//!
//! Rendering itself happens behind the `BrowserBackend` trait. The shipped
//! backend talks to a rendering service over HTTP; tests plug in fakes.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::fetch::pool::BrowserPool;
use crate::fetch::proxy::Proxy;
use crate::fetch::strategy::{FetchStrategy, StrategyRequest};
use crate::fetch::types::{BrowserAction, RawPage, StrategyKind};
use crate::FetchError;

/// Browser engine used for a render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngine {
    Chromium,
    Firefox,
}

/// How hard the render should try to get past bot checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Stealth patches and a warm-up navigation
    Standard,
    /// Also simulate mouse and scroll activity and wait out challenge pages
    Aggressive,
}

/// Proxy settings as sent to a browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderProxy {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl From<&Proxy> for RenderProxy {
    fn from(proxy: &Proxy) -> Self {
        Self {
            server: proxy.server(),
            username: proxy.username.clone(),
            password: proxy.password.clone(),
        }
    }
}

/// One render job for a browser backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub url: String,
    pub engine: BrowserEngine,
    pub mode: RenderMode,
    #[serde(default)]
    pub actions: Vec<BrowserAction>,
    pub screenshot: bool,
    pub wait_for_ms: u64,
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<RenderProxy>,
}

/// What a browser backend hands back
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderedPage {
    #[serde(default = "default_success")]
    pub success: bool,
    /// Final URL after navigation
    pub url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub action_screenshots: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Something that can render a page in a real browser
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, FetchError>;
}

/// Renders pages through an HTTP rendering service
///
/// The service receives a `RenderRequest` as JSON and answers with a
/// `RenderedPage`.
pub struct RemoteBrowserBackend {
    client: Client,
    endpoint: String,
}

impl RemoteBrowserBackend {
    pub fn new(endpoint: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl BrowserBackend for RemoteBrowserBackend {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, FetchError> {
        let browser_error = |message: String| FetchError::Browser {
            url: request.url.clone(),
            message,
        };

        debug!(
            "Sending render request to browser service: {} ({:?}, {:?})",
            request.url, request.engine, request.mode
        );

        // Leave the service some room to report its own timeout
        let timeout = Duration::from_millis(request.timeout_ms) + Duration::from_secs(5);

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| browser_error(format!("browser service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(browser_error(format!(
                "browser service returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let page: RenderedPage = response
            .json()
            .await
            .map_err(|e| browser_error(format!("invalid browser service response: {}", e)))?;

        if !page.success {
            return Err(browser_error(
                page.error
                    .unwrap_or_else(|| "render failed without an error message".to_string()),
            ));
        }

        Ok(page)
    }
}

/// A fetch strategy backed by a browser render
pub struct BrowserStrategy {
    kind: StrategyKind,
    engine: BrowserEngine,
    mode: RenderMode,
    backend: Arc<dyn BrowserBackend>,
    pool: BrowserPool,
}

impl BrowserStrategy {
    /// Chromium with stealth patches
    pub fn standard(backend: Arc<dyn BrowserBackend>, pool: BrowserPool) -> Self {
        Self {
            kind: StrategyKind::BrowserStandard,
            engine: BrowserEngine::Chromium,
            mode: RenderMode::Standard,
            backend,
            pool,
        }
    }

    /// Firefox, for a different engine and TLS fingerprint
    pub fn alt_engine(backend: Arc<dyn BrowserBackend>, pool: BrowserPool) -> Self {
        Self {
            kind: StrategyKind::BrowserAltEngine,
            engine: BrowserEngine::Firefox,
            mode: RenderMode::Standard,
            backend,
            pool,
        }
    }

    /// Chromium with human simulation and challenge waiting
    pub fn aggressive(backend: Arc<dyn BrowserBackend>, pool: BrowserPool) -> Self {
        Self {
            kind: StrategyKind::BrowserAggressive,
            engine: BrowserEngine::Chromium,
            mode: RenderMode::Aggressive,
            backend,
            pool,
        }
    }

    fn render_request(&self, request: &StrategyRequest<'_>) -> RenderRequest {
        RenderRequest {
            url: request.url.to_string(),
            engine: self.engine,
            mode: self.mode,
            actions: request.options.actions.clone(),
            screenshot: request.options.screenshot,
            wait_for_ms: request.options.wait_for_ms,
            timeout_ms: request.options.timeout.as_millis() as u64,
            proxy: request.proxy.map(RenderProxy::from),
        }
    }
}

#[async_trait]
impl FetchStrategy for BrowserStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn fetch(&self, request: StrategyRequest<'_>) -> Result<RawPage, FetchError> {
        let _lease = self.pool.acquire(request.url).await?;

        let render = self.render_request(&request);
        let page = self.backend.render(&render).await?;

        Ok(RawPage {
            url: if page.url.is_empty() {
                request.url.to_string()
            } else {
                page.url
            },
            // Browsers that cannot see the document status report 0; a
            // rendered document is treated as a successful load
            status: if page.status == 0 { 200 } else { page.status },
            body: page.html,
            headers: Default::default(),
            screenshot: page.screenshot,
            action_screenshots: page.action_screenshots,
        })
    }
}

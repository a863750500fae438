//! Single-page scraping: cache, then escalating fetch, then extraction
//!
//! URLs that name a PDF or DOCX file skip the escalator: they are
//! downloaded as bytes and run through [`crate::document`] instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::cache::{fingerprint, ContentCache};
use crate::document::{detect_document, download, extract_document, Document, DocumentKind, DownloadedBody};
use crate::extract::{
    extract_with, reading_time_seconds, ExtractOptions, Format, PageContent, PageMetadata,
    StructuredData,
};
use crate::fetch::{BrowserAction, FetchEscalator, FetchOptions, ProxyPool, RawPage};
use crate::normalize_url;
use crate::storage::JobResult;
use crate::tasks::AbortOnDrop;

/// Request for model-driven extraction, handled outside this crate
///
/// Carried so that such requests bypass the content cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// How a single page is fetched and which formats are extracted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeOptions {
    pub formats: Vec<Format>,
    pub only_main_content: bool,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    /// Milliseconds to wait after load; anything above zero needs a browser
    pub wait_for: u64,
    /// Per-strategy timeout in milliseconds
    pub timeout: u64,
    pub actions: Vec<BrowserAction>,
    pub use_proxy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractionRequest>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            formats: vec![Format::Markdown],
            only_main_content: true,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            wait_for: 0,
            timeout: 30_000,
            actions: Vec::new(),
            use_proxy: false,
            extract: None,
        }
    }
}

impl ScrapeOptions {
    pub fn wants(&self, format: Format) -> bool {
        self.formats.contains(&format)
    }

    /// Returns false for requests whose output depends on more than the URL
    pub fn is_cacheable(&self) -> bool {
        self.actions.is_empty() && !self.wants(Format::Screenshot) && self.extract.is_none()
    }

    pub fn needs_browser(&self) -> bool {
        self.fetch_options().needs_browser()
    }

    /// Adds `format` if it is not already requested
    pub fn with_format(mut self, format: Format) -> Self {
        if !self.wants(format) {
            self.formats.push(format);
        }
        self
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_millis(self.timeout),
            actions: self.actions.clone(),
            screenshot: self.wants(Format::Screenshot),
            wait_for_ms: self.wait_for,
            use_proxy: self.use_proxy,
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            only_main_content: self.only_main_content,
            include_tags: self.include_tags.clone(),
            exclude_tags: self.exclude_tags.clone(),
        }
    }
}

/// Glue between the content cache, the escalator and the extractor
///
/// Never fails: every problem ends up as a failed [`JobResult`].
#[derive(Clone)]
pub struct Scraper {
    escalator: Arc<FetchEscalator>,
    cache: Option<Arc<ContentCache>>,
    cache_ttl: Duration,
    user_agent: Option<String>,
}

impl Scraper {
    pub fn new(escalator: Arc<FetchEscalator>) -> Self {
        Self {
            escalator,
            cache: None,
            cache_ttl: Duration::ZERO,
            user_agent: None,
        }
    }

    /// User agent for document downloads
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    pub fn with_cache(mut self, cache: Arc<ContentCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn escalator(&self) -> &FetchEscalator {
        &self.escalator
    }

    pub async fn scrape(
        &self,
        url: &str,
        options: &ScrapeOptions,
        proxies: Option<&ProxyPool>,
    ) -> JobResult {
        let normalized = match normalize_url(url) {
            Ok(normalized) => normalized,
            Err(e) => return JobResult::failure(url, e.to_string()),
        };
        let url = normalized.as_str();

        let cache_key = match &self.cache {
            Some(_) if options.is_cacheable() => Some(fingerprint(url, &options.formats)),
            _ => None,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(content) = cache.get(key) {
                debug!("Cache hit for {}", url);
                return JobResult::success(url, content);
            }
        }

        if DocumentKind::from_url(url).is_some() {
            let result = self.scrape_document(url, options, proxies).await;
            if let (Some(cache), Some(key), Some(content)) = (&self.cache, cache_key, &result.content) {
                if result.success {
                    cache.put(key, content.clone(), self.cache_ttl);
                }
            }
            return result;
        }

        let outcome = match self
            .escalator
            .fetch(url, &options.fetch_options(), proxies)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Fetch failed for {}: {}", url, e);
                return JobResult::failure(url, e.to_string());
            }
        };

        let mut content = extract_with(&outcome.page, &options.formats, &options.extract_options());
        content.metadata.strategy = Some(outcome.strategy);
        content.metadata.elapsed_ms = Some(outcome.elapsed_ms);

        if !outcome.page.is_success() {
            let error = format!("HTTP {}", outcome.page.status);
            return JobResult {
                content: Some(content),
                ..JobResult::failure(url, error)
            };
        }

        if outcome.usable {
            if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
                cache.put(key, content.clone(), self.cache_ttl);
            }
        }

        JobResult::success(url, content)
    }

    /// Runs [`scrape`](Self::scrape) on a task of its own
    ///
    /// A panic while scraping becomes a failed result for `url` rather than
    /// unwinding into the caller.
    pub async fn scrape_isolated(
        &self,
        url: &str,
        options: &ScrapeOptions,
        proxies: Option<Arc<ProxyPool>>,
    ) -> JobResult {
        let scraper = self.clone();
        let target = url.to_string();
        let options = options.clone();
        let handle = tokio::spawn(async move {
            scraper.scrape(&target, &options, proxies.as_deref()).await
        });
        let _guard = AbortOnDrop(handle.abort_handle());

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                error!("Scrape of {} panicked", url);
                JobResult::failure(url, "task panicked")
            }
            Err(e) => JobResult::failure(url, format!("task failed: {}", e)),
        }
    }

    async fn scrape_document(
        &self,
        url: &str,
        options: &ScrapeOptions,
        proxies: Option<&ProxyPool>,
    ) -> JobResult {
        let started = Instant::now();
        let proxy = if options.use_proxy {
            proxies.and_then(ProxyPool::pick)
        } else {
            None
        };
        let timeout = Duration::from_millis(options.timeout);

        let mut body = match download(url, timeout, self.user_agent.as_deref(), proxy).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Document download failed for {}: {}", url, e);
                return JobResult::failure(url, e.to_string());
            }
        };
        if !body.is_success() {
            return JobResult::failure(url, format!("HTTP {}", body.status));
        }

        let Some(kind) = detect_document(&body.url, body.content_type.as_deref(), &body.bytes) else {
            debug!("{} redirected to a web page, extracting as HTML", url);
            let page = RawPage {
                url: body.url.clone(),
                status: body.status,
                body: String::from_utf8_lossy(&body.bytes).into_owned(),
                headers: body
                    .content_type
                    .iter()
                    .map(|ct| ("content-type".to_string(), ct.clone()))
                    .collect(),
                ..RawPage::default()
            };
            let mut content = extract_with(&page, &options.formats, &options.extract_options());
            content.metadata.elapsed_ms = Some(started.elapsed().as_millis() as u64);
            return JobResult::success(url, content);
        };

        let size = body.bytes.len();
        let document = match extract_document(kind, std::mem::take(&mut body.bytes)).await {
            Ok(document) => document,
            Err(e) => {
                warn!("Could not extract {} from {}: {}", kind, url, e);
                return JobResult::failure(url, e.to_string());
            }
        };
        info!(
            "Extracted {} from {} ({} bytes, {} words)",
            kind, url, size, document.word_count
        );

        let mut content = document_content(document, kind, &body, size, options);
        content.metadata.elapsed_ms = Some(started.elapsed().as_millis() as u64);
        JobResult::success(url, content)
    }
}

/// Maps an extracted document onto the requested formats
///
/// Markdown carries the rendered document; structured data carries its
/// properties as meta tags. Link lists are empty.
fn document_content(
    document: Document,
    kind: DocumentKind,
    body: &DownloadedBody,
    size: usize,
    options: &ScrapeOptions,
) -> PageContent {
    let structured = options.wants(Format::StructuredData).then(|| {
        let mut meta_tags = document.properties.clone();
        meta_tags.insert("document_type".to_string(), kind.to_string());
        meta_tags.insert("word_count".to_string(), document.word_count.to_string());
        if let Some(author) = &document.author {
            meta_tags.insert("author".to_string(), author.clone());
        }
        StructuredData {
            meta_tags,
            ..StructuredData::default()
        }
    });

    let response_headers: BTreeMap<String, String> = body
        .content_type
        .iter()
        .map(|ct| ("content-type".to_string(), ct.clone()))
        .collect();

    PageContent {
        markdown: options.wants(Format::Markdown).then(|| document.markdown.clone()),
        links: options.wants(Format::Links).then(Vec::new),
        structured_data: structured,
        metadata: PageMetadata {
            source_url: body.url.clone(),
            status_code: body.status,
            title: document.title,
            word_count: document.word_count,
            reading_time_seconds: reading_time_seconds(document.word_count),
            content_length: size,
            response_headers,
            ..PageMetadata::default()
        },
        ..PageContent::default()
    }
}

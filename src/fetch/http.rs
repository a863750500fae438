//! HTTP-client strategies
//!
//! - `ImpersonatedClient`: presents the header set of a real Chrome install,
//!   rotated per request, with a search-engine referrer and a cookie jar
//! - `GenericClient`: a plain client with a single desktop user agent

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect::Policy, Client, Response};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::fetch::proxy::Proxy;
use crate::fetch::strategy::{FetchStrategy, StrategyRequest};
use crate::fetch::types::{RawPage, StrategyKind};
use crate::FetchError;

const CHROME_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const CHROME_SEC_CH_UA: &str =
    "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"";

/// Header profiles of real desktop Chrome installs
const HEADER_PROFILES: &[&[(&str, &str)]] = &[
    &[
        (
            "user-agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        ),
        ("accept", CHROME_ACCEPT),
        ("accept-language", "en-US,en;q=0.9"),
        ("sec-ch-ua", CHROME_SEC_CH_UA),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"Windows\""),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "cross-site"),
        ("sec-fetch-user", "?1"),
        ("upgrade-insecure-requests", "1"),
        ("cache-control", "max-age=0"),
    ],
    &[
        (
            "user-agent",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        ),
        ("accept", CHROME_ACCEPT),
        ("accept-language", "en-US,en;q=0.9"),
        ("sec-ch-ua", CHROME_SEC_CH_UA),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"macOS\""),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "cross-site"),
        ("sec-fetch-user", "?1"),
        ("upgrade-insecure-requests", "1"),
    ],
];

const SEARCH_REFERRERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.google.com/search?q=",
    "https://www.google.co.uk/",
];

/// Builds a client with the shared transport settings
///
/// # Arguments
///
/// * `timeout` - Whole-request timeout
/// * `cookies` - Whether to keep a cookie jar across requests
/// * `user_agent` - Default user agent, overridable per request
/// * `proxy` - Route all traffic through this proxy
pub fn build_http_client(
    timeout: Duration,
    cookies: bool,
    user_agent: Option<&str>,
    proxy: Option<&Proxy>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .redirect(Policy::limited(10))
        .cookie_store(cookies)
        .gzip(true)
        .brotli(true);

    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }

    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy.to_reqwest()?);
    }

    builder.build()
}

/// Maps a transport error onto the fetch error taxonomy
pub fn classify_error(url: &str, timeout: Duration, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// Reads a response into a `RawPage`, keeping whatever status it carries
pub async fn read_response(
    url: &str,
    timeout: Duration,
    response: Response,
) -> Result<RawPage, FetchError> {
    let status = response.status().as_u16();
    let final_url = response.url().to_string();

    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let body = response
        .text()
        .await
        .map_err(|e| classify_error(url, timeout, e))?;

    Ok(RawPage {
        url: final_url,
        status,
        body,
        headers,
        screenshot: None,
        action_screenshots: Vec::new(),
    })
}

fn pick_profile_headers() -> HeaderMap {
    let mut rng = rand::thread_rng();
    let mut headers = HeaderMap::new();

    if let Some(profile) = HEADER_PROFILES.choose(&mut rng) {
        for (name, value) in profile.iter() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
    }

    if let Some(referrer) = SEARCH_REFERRERS.choose(&mut rng) {
        if let Ok(value) = HeaderValue::from_str(referrer) {
            headers.insert(reqwest::header::REFERER, value);
        }
    }

    headers
}

/// HTTP client that looks like a desktop Chrome browser
pub struct ImpersonatedClient {
    client: Client,
}

impl ImpersonatedClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(timeout, true, None, None)?,
        })
    }
}

#[async_trait]
impl FetchStrategy for ImpersonatedClient {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ImpersonatedClient
    }

    async fn fetch(&self, request: StrategyRequest<'_>) -> Result<RawPage, FetchError> {
        let timeout = request.options.timeout;

        let proxied;
        let client = match request.proxy {
            Some(proxy) => {
                proxied = build_http_client(timeout, true, None, Some(proxy))
                    .map_err(|e| classify_error(request.url, timeout, e))?;
                &proxied
            }
            None => &self.client,
        };

        debug!("Impersonated fetch: {}", request.url);

        let response = client
            .get(request.url)
            .headers(pick_profile_headers())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(request.url, timeout, e))?;

        read_response(request.url, timeout, response).await
    }
}

/// Plain HTTP client
pub struct GenericClient {
    client: Client,
    user_agent: String,
}

impl GenericClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(timeout, false, Some(user_agent), None)?,
            user_agent: user_agent.to_string(),
        })
    }
}

#[async_trait]
impl FetchStrategy for GenericClient {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GenericClient
    }

    async fn fetch(&self, request: StrategyRequest<'_>) -> Result<RawPage, FetchError> {
        let timeout = request.options.timeout;

        let proxied;
        let client = match request.proxy {
            Some(proxy) => {
                proxied = build_http_client(timeout, false, Some(&self.user_agent), Some(proxy))
                    .map_err(|e| classify_error(request.url, timeout, e))?;
                &proxied
            }
            None => &self.client,
        };

        debug!("Generic fetch: {}", request.url);

        let response = client
            .get(request.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(request.url, timeout, e))?;

        read_response(request.url, timeout, response).await
    }
}

//! Fetch escalation
//!
//! Strategies run in ascending cost order. After each attempt a policy
//! decides whether the content in hand is good enough, whether the next
//! strategy is worth running, or whether to stop.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::fetch::proxy::ProxyPool;
use crate::fetch::strategy::{FetchStrategy, StrategyRequest};
use crate::fetch::types::{FetchOptions, RawPage, StrategyKind};
use crate::url::matches_any_domain;
use crate::FetchError;

/// Phrases that show up on bot-challenge and interstitial pages
const BLOCK_PATTERNS: &[&str] = &[
    "javascript is disabled",
    "enable javascript",
    "requires javascript",
    "javascript is required",
    "please enable javascript",
    "you need to enable javascript",
    "this page requires javascript",
    "turn on javascript",
    "activate javascript",
    "captcha",
    "verify you are human",
    "verify you're human",
    "are you a robot",
    "not a robot",
    "bot detection",
    "access denied",
    "please verify",
    "unusual traffic",
    "automated access",
    "checking your browser",
    "just a moment",
    "attention required",
    "please wait while we verify",
    "ray id",
    "performance & security by cloudflare",
    "sucuri website firewall",
    "pardon our interruption",
    "press & hold",
    "blocked by",
    "sorry, we just need to make sure",
    "one more step",
];

/// Markup left behind by challenge widgets
const CHALLENGE_MARKERS: &[&str] = &["g-recaptcha", "h-captcha", "cf-challenge", "cf-turnstile"];

/// Pages with less visible text than this are checked for challenge markup
const TINY_TEXT_LIMIT: usize = 300;

/// What the policy wants done with the next strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Run,
    Skip,
    Stop,
}

/// Request facts the policy looks at
#[derive(Debug, Clone, Copy)]
pub struct EscalationContext {
    /// The target host is on the hard-domain list
    pub hard_domain: bool,
    /// Actions, screenshots or settle time were requested
    pub needs_browser: bool,
}

/// Thresholds and domain lists that drive escalation
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    pub sufficient_bytes: usize,
    pub partial_bytes: usize,
    pub blocked_text_limit: usize,
    pub hard_domains: Vec<String>,
}

impl EscalationPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            sufficient_bytes: config.sufficient_bytes,
            partial_bytes: config.partial_bytes,
            blocked_text_limit: config.blocked_text_limit,
            hard_domains: config.hard_domains.clone(),
        }
    }

    /// Builds the request context for a URL
    pub fn context_for(&self, url: &str, options: &FetchOptions) -> EscalationContext {
        let hard_domain = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .map(|host| matches_any_domain(&self.hard_domains, &host))
            .unwrap_or(false);

        EscalationContext {
            hard_domain,
            needs_browser: options.needs_browser(),
        }
    }

    /// Decides what to do with `next` given the best usable content so far
    ///
    /// # Rules (first match wins)
    ///
    /// 1. Usable content of at least `sufficient_bytes` → `Stop`
    /// 2. The request needs a browser and `next` is an HTTP client → `Skip`
    /// 3. `next` is the generic client and the host is hard → `Skip`
    /// 4. `next` is the aggressive browser and usable content of at least
    ///    `partial_bytes` exists → `Skip`
    /// 5. Otherwise → `Run`
    pub fn decide(
        &self,
        best_usable_len: Option<usize>,
        next: StrategyKind,
        context: &EscalationContext,
    ) -> Step {
        let best = best_usable_len.unwrap_or(0);

        if best_usable_len.is_some() && best >= self.sufficient_bytes {
            return Step::Stop;
        }

        if context.needs_browser && !next.is_browser() {
            return Step::Skip;
        }

        if next == StrategyKind::GenericClient && context.hard_domain {
            return Step::Skip;
        }

        if next == StrategyKind::BrowserAggressive
            && best_usable_len.is_some()
            && best >= self.partial_bytes
        {
            return Step::Skip;
        }

        Step::Run
    }

    /// Usable means a 2xx, non-empty page that is not a challenge page
    pub fn is_usable(&self, page: &RawPage) -> bool {
        page.is_success() && !page.is_empty() && !looks_blocked(&page.body, self.blocked_text_limit)
    }
}

/// The page an escalation settled on
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub page: RawPage,
    pub strategy: StrategyKind,
    /// False when this is only the largest body seen and not usable content
    pub usable: bool,
    /// Strategies that actually ran, in order
    pub attempts: Vec<StrategyKind>,
    pub elapsed_ms: u64,
}

/// Runs strategies in order under an `EscalationPolicy`
pub struct FetchEscalator {
    strategies: Vec<Arc<dyn FetchStrategy>>,
    policy: EscalationPolicy,
}

impl FetchEscalator {
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>, policy: EscalationPolicy) -> Self {
        Self { strategies, policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Fetches a URL, escalating through strategies as needed
    ///
    /// When `use_proxy` is set and a pool is given, one proxy is chosen up
    /// front and every attempt goes through it.
    ///
    /// # Returns
    ///
    /// * `Ok(FetchOutcome)` - Usable content, or failing that the largest
    ///   non-empty body any strategy produced
    /// * `Err(FetchError::Exhausted)` - Nothing came back at all
    pub async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        proxies: Option<&ProxyPool>,
    ) -> Result<FetchOutcome, FetchError> {
        let started = Instant::now();
        let context = self.policy.context_for(url, options);

        let proxy = if options.use_proxy {
            proxies.and_then(ProxyPool::pick)
        } else {
            None
        };
        if let Some(proxy) = proxy {
            debug!("Routing {} through proxy {}", url, proxy.masked());
        }

        let request = StrategyRequest {
            url,
            options,
            proxy,
        };

        let mut best_usable: Option<(RawPage, StrategyKind)> = None;
        let mut largest: Option<(RawPage, StrategyKind)> = None;
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            let best_len = best_usable.as_ref().map(|(page, _)| page.len());

            match self.policy.decide(best_len, kind, &context) {
                Step::Stop => break,
                Step::Skip => {
                    debug!("Skipping {} for {}", kind, url);
                    continue;
                }
                Step::Run => {}
            }

            attempts.push(kind);

            let page = match tokio::time::timeout(options.timeout, strategy.fetch(request)).await {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    debug!("{} failed for {}: {}", kind, url, e);
                    continue;
                }
                Err(_) => {
                    debug!(
                        "{} timed out for {} after {}ms",
                        kind,
                        url,
                        options.timeout.as_millis()
                    );
                    continue;
                }
            };

            if self.policy.is_usable(&page) {
                debug!("{} returned {} usable bytes for {}", kind, page.len(), url);
                if best_len.map_or(true, |len| page.len() > len) {
                    best_usable = Some((page, kind));
                }
            } else {
                debug!(
                    "{} blocked for {} (HTTP {}, {} bytes), escalating",
                    kind,
                    url,
                    page.status,
                    page.len()
                );
                if !page.is_empty()
                    && largest
                        .as_ref()
                        .map_or(true, |(best, _)| page.len() > best.len())
                {
                    largest = Some((page, kind));
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some((page, strategy)) = best_usable {
            info!("Fetched {} via {} ({} bytes)", url, strategy, page.len());
            return Ok(FetchOutcome {
                page,
                strategy,
                usable: true,
                attempts,
                elapsed_ms,
            });
        }

        if let Some((page, strategy)) = largest {
            warn!(
                "All strategies blocked for {}, using largest response ({} bytes via {})",
                url,
                page.len(),
                strategy
            );
            return Ok(FetchOutcome {
                page,
                strategy,
                usable: false,
                attempts,
                elapsed_ms,
            });
        }

        warn!("All strategies exhausted for {}", url);
        Err(FetchError::Exhausted {
            url: url.to_string(),
        })
    }
}

fn body_regex() -> &'static Regex {
    static BODY: OnceLock<Regex> = OnceLock::new();
    BODY.get_or_init(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").expect("valid regex"))
}

fn hidden_block_regex() -> &'static Regex {
    static HIDDEN: OnceLock<Regex> = OnceLock::new();
    HIDDEN.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
            .expect("valid regex")
    })
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

/// Returns the lowercased visible text of a document's body
pub fn visible_text(html: &str) -> String {
    let body = body_regex()
        .captures(html)
        .and_then(|c| c.get(1))
        .map_or(html, |m| m.as_str());

    let without_hidden = hidden_block_regex().replace_all(body, " ");
    let text = tag_regex().replace_all(&without_hidden, " ");

    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Heuristic check for bot-challenge and interstitial pages
///
/// Only short pages are inspected: a long article that happens to mention
/// "captcha" is still content.
pub fn looks_blocked(html: &str, text_limit: usize) -> bool {
    if html.trim().is_empty() {
        return true;
    }

    let text = visible_text(html);

    if text.len() < text_limit && BLOCK_PATTERNS.iter().any(|p| text.contains(p)) {
        return true;
    }

    if text.len() < TINY_TEXT_LIMIT {
        let lower = html.to_lowercase();
        if CHALLENGE_MARKERS.iter().any(|m| lower.contains(m)) {
            return true;
        }
    }

    false
}

//! Escalation, proxy and cache behaviour through the public fetch API

use crate::common::{article, challenge, ok_page, policy, ScriptedStrategy};
use harvest_engine::cache::ContentCache;
use harvest_engine::extract::Format;
use harvest_engine::fetch::{
    EscalationPolicy, FetchEscalator, FetchOptions, FetchStrategy, Proxy, ProxyPool, RawPage,
    StrategyKind,
};
use harvest_engine::scrape::{ScrapeOptions, Scraper};
use harvest_engine::FetchError;
use std::sync::Arc;
use std::time::Duration;

fn chain(strategies: &[&Arc<ScriptedStrategy>]) -> Vec<Arc<dyn FetchStrategy>> {
    strategies
        .iter()
        .map(|s| Arc::clone(s) as Arc<dyn FetchStrategy>)
        .collect()
}

#[tokio::test]
async fn test_sufficient_content_stops_escalation() {
    let impersonated = ScriptedStrategy::serving(StrategyKind::ImpersonatedClient, article(8000));
    let generic = ScriptedStrategy::serving(StrategyKind::GenericClient, article(9000));
    let browser = ScriptedStrategy::serving(StrategyKind::BrowserStandard, article(9000));
    let escalator = FetchEscalator::new(chain(&[&impersonated, &generic, &browser]), policy());

    let outcome = escalator
        .fetch("https://news.example.com/story", &FetchOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::ImpersonatedClient);
    assert!(outcome.usable);
    assert_eq!(outcome.attempts, vec![StrategyKind::ImpersonatedClient]);
    assert_eq!(generic.calls(), 0);
    assert_eq!(browser.calls(), 0);
}

#[tokio::test]
async fn test_challenge_page_escalates_to_browser() {
    let impersonated = ScriptedStrategy::serving(StrategyKind::ImpersonatedClient, challenge());
    let generic = ScriptedStrategy::failing(StrategyKind::GenericClient);
    let browser = ScriptedStrategy::serving(StrategyKind::BrowserStandard, article(6000));
    let escalator = FetchEscalator::new(chain(&[&impersonated, &generic, &browser]), policy());

    let outcome = escalator
        .fetch("https://shop.example.com/", &FetchOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::BrowserStandard);
    assert_eq!(
        outcome.attempts,
        vec![
            StrategyKind::ImpersonatedClient,
            StrategyKind::GenericClient,
            StrategyKind::BrowserStandard
        ]
    );
}

#[tokio::test]
async fn test_small_usable_page_keeps_escalating_but_wins_if_nothing_better() {
    let impersonated = ScriptedStrategy::serving(StrategyKind::ImpersonatedClient, article(600));
    let generic = ScriptedStrategy::failing(StrategyKind::GenericClient);
    let escalator = FetchEscalator::new(chain(&[&impersonated, &generic]), policy());

    let outcome = escalator
        .fetch("https://blog.example.com/", &FetchOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(generic.calls(), 1);
    assert_eq!(outcome.strategy, StrategyKind::ImpersonatedClient);
    assert!(outcome.usable);
}

#[tokio::test]
async fn test_hard_domain_skips_generic_client() {
    let impersonated = ScriptedStrategy::serving(StrategyKind::ImpersonatedClient, challenge());
    let generic = ScriptedStrategy::serving(StrategyKind::GenericClient, article(9000));
    let browser = ScriptedStrategy::serving(StrategyKind::BrowserStandard, article(9000));
    let policy = EscalationPolicy {
        hard_domains: vec!["walled.example".to_string()],
        ..policy()
    };
    let escalator = FetchEscalator::new(chain(&[&impersonated, &generic, &browser]), policy);

    let outcome = escalator
        .fetch("https://www.walled.example/jobs", &FetchOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(generic.calls(), 0);
    assert_eq!(outcome.strategy, StrategyKind::BrowserStandard);
}

#[tokio::test]
async fn test_browser_only_request_skips_http_clients() {
    let impersonated = ScriptedStrategy::serving(StrategyKind::ImpersonatedClient, article(9000));
    let browser = ScriptedStrategy::serving(StrategyKind::BrowserStandard, article(9000));
    let escalator = FetchEscalator::new(chain(&[&impersonated, &browser]), policy());

    let options = FetchOptions {
        screenshot: true,
        ..FetchOptions::default()
    };
    let outcome = escalator
        .fetch("https://example.com/", &options, None)
        .await
        .unwrap();

    assert_eq!(impersonated.calls(), 0);
    assert_eq!(outcome.strategy, StrategyKind::BrowserStandard);
}

#[tokio::test]
async fn test_one_proxy_for_whole_escalation() {
    let impersonated = ScriptedStrategy::serving(StrategyKind::ImpersonatedClient, challenge());
    let generic = ScriptedStrategy::serving(StrategyKind::GenericClient, challenge());
    let browser = ScriptedStrategy::serving(StrategyKind::BrowserStandard, article(9000));
    let escalator = FetchEscalator::new(chain(&[&impersonated, &generic, &browser]), policy());

    let pool = ProxyPool::new(
        (1..=5)
            .map(|i| Proxy::from_url(&format!("http://proxy{}.local:8080", i)).unwrap())
            .collect(),
    );
    let options = FetchOptions {
        use_proxy: true,
        ..FetchOptions::default()
    };

    for _ in 0..10 {
        escalator
            .fetch("https://example.com/", &options, Some(&pool))
            .await
            .unwrap();
    }

    let seen: Vec<Option<String>> = impersonated
        .proxies_seen()
        .into_iter()
        .zip(generic.proxies_seen())
        .zip(browser.proxies_seen())
        .map(|((a, b), c)| {
            assert_eq!(a, b);
            assert_eq!(b, c);
            a
        })
        .collect();
    assert_eq!(seen.len(), 10);
    assert!(seen.iter().all(Option::is_some));
}

#[tokio::test]
async fn test_no_proxy_unless_requested() {
    let generic = ScriptedStrategy::serving(StrategyKind::GenericClient, article(9000));
    let escalator = FetchEscalator::new(chain(&[&generic]), policy());
    let pool = ProxyPool::new(vec![Proxy::from_url("http://proxy.local:8080").unwrap()]);

    escalator
        .fetch("https://example.com/", &FetchOptions::default(), Some(&pool))
        .await
        .unwrap();

    assert_eq!(generic.proxies_seen(), vec![None]);
}

#[tokio::test]
async fn test_all_strategies_failing_is_exhausted() {
    let impersonated = ScriptedStrategy::failing(StrategyKind::ImpersonatedClient);
    let generic = ScriptedStrategy::failing(StrategyKind::GenericClient);
    let escalator = FetchEscalator::new(chain(&[&impersonated, &generic]), policy());

    let err = escalator
        .fetch("https://down.example.com/", &FetchOptions::default(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Exhausted { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_blocked_everywhere_returns_largest_response() {
    let impersonated = ScriptedStrategy::serving(StrategyKind::ImpersonatedClient, challenge());
    let generic = ScriptedStrategy::new(StrategyKind::GenericClient, |url| {
        Ok(RawPage {
            status: 403,
            ..ok_page(url, &format!("<html><body>{}</body></html>", "Forbidden. ".repeat(50)))
        })
    });
    let escalator = FetchEscalator::new(chain(&[&impersonated, &generic]), policy());

    let outcome = escalator
        .fetch("https://example.com/", &FetchOptions::default(), None)
        .await
        .unwrap();

    assert!(!outcome.usable);
    assert_eq!(outcome.strategy, StrategyKind::GenericClient);
    assert_eq!(outcome.page.status, 403);
}

#[tokio::test]
async fn test_cache_hit_avoids_strategies() {
    let generic = ScriptedStrategy::serving(StrategyKind::GenericClient, article(6000));
    let escalator = Arc::new(FetchEscalator::new(chain(&[&generic]), policy()));
    let scraper =
        Scraper::new(escalator).with_cache(Arc::new(ContentCache::new()), Duration::from_secs(60));

    let options = ScrapeOptions::default();
    let first = scraper.scrape("https://example.com/a#top", &options, None).await;
    let second = scraper.scrape("https://example.com/a", &options, None).await;

    assert!(first.success && second.success);
    assert_eq!(generic.calls(), 1);
    assert_eq!(
        first.content.unwrap().markdown,
        second.content.unwrap().markdown
    );
}

#[tokio::test]
async fn test_cache_keyed_by_formats() {
    let generic = ScriptedStrategy::serving(StrategyKind::GenericClient, article(6000));
    let escalator = Arc::new(FetchEscalator::new(chain(&[&generic]), policy()));
    let scraper =
        Scraper::new(escalator).with_cache(Arc::new(ContentCache::new()), Duration::from_secs(60));

    let markdown = ScrapeOptions::default();
    let with_links = ScrapeOptions::default().with_format(Format::Links);
    scraper.scrape("https://example.com/a", &markdown, None).await;
    scraper.scrape("https://example.com/a", &with_links, None).await;

    assert_eq!(generic.calls(), 2);
}

#[tokio::test]
async fn test_screenshot_requests_bypass_cache() {
    let browser = ScriptedStrategy::new(StrategyKind::BrowserStandard, |url| {
        Ok(RawPage {
            screenshot: Some("iVBORw0KGgo=".to_string()),
            ..ok_page(url, &article(6000))
        })
    });
    let escalator = Arc::new(FetchEscalator::new(chain(&[&browser]), policy()));
    let scraper =
        Scraper::new(escalator).with_cache(Arc::new(ContentCache::new()), Duration::from_secs(60));

    let options = ScrapeOptions::default().with_format(Format::Screenshot);
    let first = scraper.scrape("https://example.com/", &options, None).await;
    scraper.scrape("https://example.com/", &options, None).await;

    assert_eq!(browser.calls(), 2);
    assert_eq!(
        first.content.unwrap().screenshot.as_deref(),
        Some("iVBORw0KGgo=")
    );
}

#[tokio::test]
async fn test_failed_fetch_is_not_cached() {
    let generic = ScriptedStrategy::new(StrategyKind::GenericClient, |url| {
        Ok(RawPage {
            status: 503,
            ..ok_page(url, "<html><body>Service temporarily unavailable</body></html>")
        })
    });
    let escalator = Arc::new(FetchEscalator::new(chain(&[&generic]), policy()));
    let cache = Arc::new(ContentCache::new());
    let scraper = Scraper::new(escalator).with_cache(Arc::clone(&cache), Duration::from_secs(60));

    let result = scraper
        .scrape("https://example.com/", &ScrapeOptions::default(), None)
        .await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("HTTP 503"));
    assert!(result.content.is_some());
    assert!(cache.is_empty());
}

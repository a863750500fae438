//! Job lifecycle through the orchestrator

use crate::common::{article, http_escalator, ok_page, page, policy, ScriptedStrategy};
use async_trait::async_trait;
use harvest_engine::config::Config;
use harvest_engine::fetch::{FetchEscalator, StrategyKind};
use harvest_engine::jobs::{
    BatchItem, BatchJob, CrawlJob, JobSpec, MapJob, ScrapeJob, SearchJob, SubmitError,
};
use harvest_engine::extract::Format;
use harvest_engine::scrape::ScrapeOptions;
use harvest_engine::search::{SearchChain, SearchError, SearchHit, SearchProvider};
use harvest_engine::storage::{JobStore, MemoryJobStore};
use harvest_engine::{JobKind, JobOrchestrator, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.jobs.poll_interval_ms = 10;
    config
}

fn orchestrator(config: &Config, search: SearchChain) -> JobOrchestrator {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    JobOrchestrator::new(config, store, http_escalator(), search).unwrap()
}

struct StaticSearch {
    hits: Vec<SearchHit>,
}

#[async_trait]
impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/ok\d$"))
        .respond_with(html(page("ok", &[])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&test_config(), SearchChain::default());
    let spec = JobSpec::Batch(BatchJob {
        urls: vec![
            format!("{}/ok1", server.uri()),
            format!("{}/missing", server.uri()),
            format!("{}/ok2", server.uri()),
        ],
        concurrency: 2,
        ..BatchJob::default()
    });

    let id = orchestrator.submit("alice", spec).await.unwrap();
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_units, 3);
    assert_eq!(job.completed_units, 3);

    let results = orchestrator.results(id).await.unwrap();
    assert_eq!(results.len(), 3);
    let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].url.ends_with("/missing"));
}

#[tokio::test]
async fn test_batch_item_overrides_formats() {
    let server = MockServer::start().await;
    let link = format!("{}/elsewhere", server.uri());
    Mock::given(method("GET"))
        .respond_with(html(page("linked", &[link])))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&test_config(), SearchChain::default());
    let spec = JobSpec::Batch(BatchJob {
        items: vec![BatchItem {
            url: format!("{}/with-links", server.uri()),
            formats: Some(vec![Format::Links]),
            ..BatchItem::default()
        }],
        ..BatchJob::default()
    });

    let id = orchestrator.submit("alice", spec).await.unwrap();
    orchestrator.wait(id).await.unwrap();

    let results = orchestrator.results(id).await.unwrap();
    let content = results[0].content.as_ref().unwrap();
    assert!(content.markdown.is_none());
    assert_eq!(content.links.as_ref().unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_scrapes_hits_and_keeps_snippets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(page("hit", &[])))
        .mount(&server)
        .await;

    let hits = (1..=4)
        .map(|i| SearchHit {
            url: format!("{}/hit{}", server.uri(), i),
            title: Some(format!("Hit {}", i)),
            snippet: Some(format!("snippet {}", i)),
        })
        .collect();
    let search = SearchChain::new(vec![Arc::new(StaticSearch { hits })]);
    let orchestrator = orchestrator(&test_config(), search);

    let spec = JobSpec::Search(SearchJob {
        query: "rust crawlers".to_string(),
        num_results: 3,
        options: ScrapeOptions::default(),
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    let results = orchestrator.results(id).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.success && r.snippet.is_some()));
}

#[tokio::test]
async fn test_search_without_providers_fails_job() {
    let orchestrator = orchestrator(&test_config(), SearchChain::default());

    let spec = JobSpec::Search(SearchJob {
        query: "anything".to_string(),
        num_results: 3,
        options: ScrapeOptions::default(),
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
}

#[tokio::test]
async fn test_map_merges_sitemap_and_homepage_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    let sitemap = format!(
        "<?xml version=\"1.0\"?><urlset><url><loc>{b}/docs/intro</loc></url><url><loc>{b}/docs/setup</loc></url><url><loc>https://other.example/x</loc></url></urlset>",
        b = base
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page(
            "home",
            &[format!("{}/blog", base), format!("{}/docs/intro#top", base)],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&test_config(), SearchChain::default());
    let spec = JobSpec::Map(MapJob {
        url: format!("{}/", base),
        ..MapJob::default()
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();
    let job = orchestrator.wait(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let urls: Vec<String> = orchestrator
        .results(id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(
        urls,
        vec![
            format!("{}/docs/intro", base),
            format!("{}/docs/setup", base),
            format!("{}/", base),
            format!("{}/blog", base),
        ]
    );

    let filtered = JobSpec::Map(MapJob {
        url: format!("{}/", base),
        search: Some("SETUP".to_string()),
        ..MapJob::default()
    });
    let id = orchestrator.submit("alice", filtered).await.unwrap();
    orchestrator.wait(id).await.unwrap();
    assert_eq!(orchestrator.results(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_running_crawl_keeps_partial_results() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page(
            "home",
            &[format!("{}/slow1", base), format!("{}/slow2", base)],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/slow\d$"))
        .respond_with(html(page("slow", &[])).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&test_config(), SearchChain::default());
    let spec = JobSpec::Crawl(CrawlJob {
        url: format!("{}/", base),
        scrape_options: ScrapeOptions {
            timeout: 1_000,
            ..ScrapeOptions::default()
        },
        ..CrawlJob::default()
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();

    while orchestrator.results(id).await.unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    orchestrator.cancel(id).await.unwrap();

    let job = tokio::time::timeout(Duration::from_secs(5), orchestrator.wait(id))
        .await
        .expect("cancelled crawl should stop within the fetch timeout")
        .unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(!orchestrator.results(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(page("page", &[])).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&test_config(), SearchChain::default());
    let spec = JobSpec::Batch(BatchJob {
        urls: (0..5).map(|i| format!("{}/p{}", server.uri(), i)).collect(),
        concurrency: 1,
        ..BatchJob::default()
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();

    let rank = |status: JobStatus| match status {
        JobStatus::Pending => 0,
        JobStatus::Running => 1,
        _ => 2,
    };
    let mut last_rank = 0;
    let mut last_completed = 0;
    loop {
        let job = orchestrator.status(id).await.unwrap();
        assert!(rank(job.status) >= last_rank);
        assert!(job.completed_units >= last_completed);
        last_rank = rank(job.status);
        last_completed = job.completed_units;
        if job.status.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
}

#[tokio::test]
async fn test_rate_limited_submission_creates_no_job() {
    let mut config = test_config();
    config.rate_limits.crawl = 2;
    let orchestrator = orchestrator(&config, SearchChain::default());

    let spec = || {
        JobSpec::Crawl(CrawlJob {
            url: "http://127.0.0.1:9/".to_string(),
            max_pages: 1,
            ..CrawlJob::default()
        })
    };

    orchestrator.submit("alice", spec()).await.unwrap();
    orchestrator.submit("alice", spec()).await.unwrap();
    let err = orchestrator.submit("alice", spec()).await.unwrap_err();
    assert!(matches!(
        err,
        SubmitError::RateLimited { kind: JobKind::Crawl, .. }
    ));
}

/// Waits until the mock server has seen at least `count` requests
async fn wait_for_requests(server: &MockServer, count: usize) {
    while server.received_requests().await.unwrap().len() < count {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_cancelled_batch_records_in_flight_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fast"))
        .respond_with(html(page("fast", &[])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html(page("slow", &[])).set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&test_config(), SearchChain::default());
    let spec = JobSpec::Batch(BatchJob {
        urls: vec![
            format!("{}/fast", server.uri()),
            format!("{}/slow", server.uri()),
            format!("{}/never", server.uri()),
        ],
        concurrency: 1,
        ..BatchJob::default()
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();

    while orchestrator.results(id).await.unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    orchestrator.cancel(id).await.unwrap();

    let job = orchestrator.wait(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    let results = orchestrator.results(id).await.unwrap();
    let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(results.len(), 2, "got {:?}", urls);
    assert!(results.iter().all(|r| r.success));
    assert!(urls.iter().any(|u| u.ends_with("/slow")));
    assert!(!urls.iter().any(|u| u.ends_with("/never")));
}

#[tokio::test]
async fn test_cancelled_scrape_keeps_its_in_flight_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(page("slow", &[])).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&test_config(), SearchChain::default());
    let spec = JobSpec::Scrape(ScrapeJob {
        url: format!("{}/slow", server.uri()),
        options: ScrapeOptions::default(),
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();

    wait_for_requests(&server, 1).await;
    orchestrator.cancel(id).await.unwrap();

    let job = orchestrator.wait(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    let results = orchestrator.results(id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
}

#[tokio::test]
async fn test_panicking_batch_item_does_not_fail_job() {
    let body = article(2_000);
    let strategy = ScriptedStrategy::new(StrategyKind::GenericClient, move |url| {
        if url.contains("explode") {
            panic!("strategy bug on {}", url);
        }
        Ok(ok_page(url, &body))
    });
    let escalator = Arc::new(FetchEscalator::new(vec![strategy], policy()));
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let orchestrator =
        JobOrchestrator::new(&test_config(), store, escalator, SearchChain::default()).unwrap();

    let spec = JobSpec::Batch(BatchJob {
        urls: vec![
            "https://site.test/one".to_string(),
            "https://site.test/explode".to_string(),
            "https://site.test/two".to_string(),
        ],
        concurrency: 3,
        ..BatchJob::default()
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();
    let job = orchestrator.wait(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_units, 3);
    let results = orchestrator.results(id).await.unwrap();
    let exploded = results.iter().find(|r| r.url.ends_with("/explode")).unwrap();
    assert!(!exploded.success);
    assert_eq!(exploded.error.as_deref(), Some("task panicked"));
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);
}

#[tokio::test]
async fn test_map_routes_every_request_through_one_proxy() {
    // The mock server plays the proxy; site.test is never resolved locally
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: *\nAllow: /\nSitemap: http://site.test/extra-sitemap.xml\n",
        ))
        .mount(&proxy)
        .await;
    Mock::given(method("GET"))
        .and(path("/extra-sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<urlset><url><loc><![CDATA[http://site.test/docs?a=1&b=2]]></loc></url></urlset>",
        ))
        .mount(&proxy)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page("home", &["http://site.test/blog".to_string()])))
        .mount(&proxy)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&proxy)
        .await;

    let orchestrator = orchestrator(&test_config(), SearchChain::default());
    orchestrator.set_user_proxies("alice", &[proxy.uri()]).unwrap();

    let spec = JobSpec::Map(MapJob {
        url: "http://site.test/".to_string(),
        use_proxy: true,
        ..MapJob::default()
    });
    let id = orchestrator.submit("alice", spec).await.unwrap();
    let job = orchestrator.wait(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let urls: Vec<String> = orchestrator
        .results(id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(
        urls,
        vec![
            "http://site.test/docs?a=1&b=2".to_string(),
            "http://site.test/".to_string(),
            "http://site.test/blog".to_string(),
        ]
    );

    let seen: Vec<String> = proxy
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|r| {
            assert_eq!(r.url.host_str(), Some("site.test"));
            r.url.path().to_string()
        })
        .collect();
    for expected in ["/robots.txt", "/sitemap.xml", "/extra-sitemap.xml", "/"] {
        assert!(seen.iter().any(|p| p == expected), "{} not proxied: {:?}", expected, seen);
    }
}

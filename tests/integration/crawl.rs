//! End-to-end crawls against mock sites

use crate::common::{http_escalator, ok_page, page, policy, running_job, ScriptedStrategy, TEST_AGENT};
use harvest_engine::crawler::{CrawlEngine, CrawlOutcome};
use harvest_engine::fetch::{FetchEscalator, StrategyKind};
use harvest_engine::jobs::{CrawlJob, JobSpec};
use harvest_engine::robots::robots_client;
use harvest_engine::scrape::{ScrapeOptions, Scraper};
use harvest_engine::storage::{JobStore, MemoryJobStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

async fn mount_page(server: &MockServer, route: &str, links: &[&str]) {
    let links: Vec<String> = links
        .iter()
        .map(|l| format!("{}{}", server.uri(), l))
        .collect();
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(page(route, &links)))
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn engine(store: &Arc<dyn JobStore>) -> CrawlEngine {
    engine_with(store, Scraper::new(http_escalator()))
}

fn engine_with(store: &Arc<dyn JobStore>, scraper: Scraper) -> CrawlEngine {
    let client = robots_client(TEST_AGENT, Duration::from_secs(5)).unwrap();
    CrawlEngine::new(scraper, Arc::clone(store), client, TEST_AGENT)
}

fn crawl_of(server: &MockServer) -> CrawlJob {
    CrawlJob {
        url: format!("{}/", server.uri()),
        concurrency: 2,
        ..CrawlJob::default()
    }
}

async fn run(store: &Arc<dyn JobStore>, job: CrawlJob) -> (uuid::Uuid, CrawlOutcome) {
    let id = running_job(store, JobSpec::Crawl(job.clone())).await;
    let outcome = engine(store)
        .run(id, &job, None, &CancellationToken::new())
        .await
        .unwrap();
    (id, outcome)
}

fn paths(results: &[harvest_engine::storage::JobResult]) -> Vec<String> {
    let mut paths: Vec<String> = results
        .iter()
        .map(|r| url::Url::parse(&r.url).unwrap().path().to_string())
        .collect();
    paths.sort();
    paths
}

#[tokio::test]
async fn test_crawl_visits_each_page_once() {
    let server = MockServer::start().await;
    mount_robots(&server, ResponseTemplate::new(404)).await;
    mount_page(&server, "/", &["/a", "/b", "/a#again", "/b/"]).await;
    mount_page(&server, "/a", &["/", "/c"]).await;
    mount_page(&server, "/b", &["/c", "/a"]).await;
    mount_page(&server, "/c", &["/"]).await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let (id, outcome) = run(&store, crawl_of(&server)).await;

    assert_eq!(outcome, CrawlOutcome::Completed);
    let results = store.get_results(id).await.unwrap();
    assert_eq!(paths(&results), vec!["/", "/a", "/b", "/c"]);
    assert!(results.iter().all(|r| r.success));

    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.completed_units, 4);
    assert_eq!(job.total_units, 4);
}

#[tokio::test]
async fn test_crawl_respects_max_depth() {
    let server = MockServer::start().await;
    mount_robots(&server, ResponseTemplate::new(404)).await;
    mount_page(&server, "/", &["/one"]).await;
    mount_page(&server, "/one", &["/two"]).await;
    mount_page(&server, "/two", &["/three"]).await;
    mount_page(&server, "/three", &[]).await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let job = CrawlJob {
        max_depth: 1,
        ..crawl_of(&server)
    };
    let (id, _) = run(&store, job).await;

    let results = store.get_results(id).await.unwrap();
    assert_eq!(paths(&results), vec!["/", "/one"]);
}

#[tokio::test]
async fn test_page_cap_completes_crawl() {
    let server = MockServer::start().await;
    mount_robots(&server, ResponseTemplate::new(404)).await;

    let links: Vec<String> = (0..100).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&server, "/", &link_refs).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html(page("leaf", &[])))
        .mount(&server)
        .await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let job = CrawlJob {
        max_pages: 10,
        concurrency: 5,
        ..crawl_of(&server)
    };
    let (id, outcome) = run(&store, job).await;

    assert_eq!(outcome, CrawlOutcome::Completed);
    assert_eq!(store.get_results(id).await.unwrap().len(), 10);
    let record = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(record.completed_units, 10);
    assert_eq!(record.total_units, 10);
}

#[tokio::test]
async fn test_failed_page_does_not_stop_crawl() {
    let server = MockServer::start().await;
    mount_robots(&server, ResponseTemplate::new(404)).await;
    mount_page(&server, "/", &["/broken", "/fine"]).await;
    mount_page(&server, "/fine", &[]).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let (id, outcome) = run(&store, crawl_of(&server)).await;

    assert_eq!(outcome, CrawlOutcome::Completed);
    let results = store.get_results(id).await.unwrap();
    assert_eq!(results.len(), 3);

    let broken = results.iter().find(|r| r.url.ends_with("/broken")).unwrap();
    assert!(!broken.success);
    assert!(broken.error.is_some());
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);
}

#[tokio::test]
async fn test_robots_disallow_is_honored() {
    let server = MockServer::start().await;
    mount_robots(
        &server,
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
    )
    .await;
    mount_page(&server, "/", &["/public", "/private/report"]).await;
    mount_page(&server, "/public", &[]).await;
    mount_page(&server, "/private/report", &[]).await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let (id, _) = run(&store, crawl_of(&server)).await;
    assert_eq!(
        paths(&store.get_results(id).await.unwrap()),
        vec!["/", "/public"]
    );

    let ignoring = CrawlJob {
        respect_robots_txt: false,
        ..crawl_of(&server)
    };
    let (id, _) = run(&store, ignoring).await;
    assert_eq!(
        paths(&store.get_results(id).await.unwrap()),
        vec!["/", "/private/report", "/public"]
    );
}

#[tokio::test]
async fn test_robots_failure_allows_everything() {
    let server = MockServer::start().await;
    mount_robots(&server, ResponseTemplate::new(503)).await;
    mount_page(&server, "/", &["/next"]).await;
    mount_page(&server, "/next", &[]).await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let (id, _) = run(&store, crawl_of(&server)).await;

    assert_eq!(paths(&store.get_results(id).await.unwrap()), vec!["/", "/next"]);
}

#[tokio::test]
async fn test_external_links_stay_unvisited() {
    let server = MockServer::start().await;
    let other = MockServer::start().await;
    mount_robots(&server, ResponseTemplate::new(404)).await;

    let external = format!("http://localhost:{}/elsewhere", other.address().port());
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page("home", &[external])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html(page("elsewhere", &[])))
        .expect(0)
        .mount(&other)
        .await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let (id, _) = run(&store, crawl_of(&server)).await;

    assert_eq!(store.get_results(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_returns_within_fetch_timeout() {
    let server = MockServer::start().await;
    mount_robots(&server, ResponseTemplate::new(404)).await;
    mount_page(&server, "/", &["/slow1", "/slow2"]).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/slow\d$"))
        .respond_with(html(page("slow", &[])).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let job = CrawlJob {
        scrape_options: ScrapeOptions {
            timeout: 1_000,
            ..ScrapeOptions::default()
        },
        ..crawl_of(&server)
    };
    let id = running_job(&store, JobSpec::Crawl(job.clone())).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher_store = Arc::clone(&store);
    tokio::spawn(async move {
        // Cancel once the start page is recorded and the slow pages are in flight
        loop {
            if !watcher_store.get_results(id).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = engine(&store).run(id, &job, None, &cancel).await.unwrap();

    assert_eq!(outcome, CrawlOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    let results = store.get_results(id).await.unwrap();
    assert!(!results.is_empty());
    assert!(results[0].success);
}

#[tokio::test]
async fn test_depth_one_pages_fetched_before_depth_two() {
    let server = MockServer::start().await;
    mount_robots(&server, ResponseTemplate::new(404)).await;
    mount_page(&server, "/", &["/a1", "/a2", "/a3"]).await;
    for a in 1..=3 {
        let children: Vec<String> = (1..=2)
            .map(|b| format!("{}/b{}{}", server.uri(), a, b))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/a{}", a)))
            .respond_with(html(page("depth one", &children)).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path_regex(r"^/b\d\d$"))
        .respond_with(html(page("depth two", &[])))
        .mount(&server)
        .await;

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let job = CrawlJob {
        concurrency: 3,
        ..crawl_of(&server)
    };
    let (_, outcome) = run(&store, job).await;
    assert_eq!(outcome, CrawlOutcome::Completed);

    let order: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url.path().to_string())
        .filter(|p| p != "/robots.txt")
        .collect();
    assert_eq!(order.len(), 10);

    let last_depth_one = order.iter().rposition(|p| p.starts_with("/a")).unwrap();
    let first_depth_two = order.iter().position(|p| p.starts_with("/b")).unwrap();
    assert!(
        last_depth_one < first_depth_two,
        "depth-2 page fetched before all depth-1 pages: {:?}",
        order
    );
}

#[tokio::test]
async fn test_panicking_page_is_recorded_as_failure() {
    let strategy = ScriptedStrategy::new(StrategyKind::GenericClient, |url| {
        if url.ends_with("/boom") {
            panic!("parser blew up on {}", url);
        }
        let links = vec![
            "https://site.test/boom".to_string(),
            "https://site.test/fine".to_string(),
        ];
        Ok(ok_page(url, &page("site", &links)))
    });
    let escalator = Arc::new(FetchEscalator::new(vec![strategy], policy()));

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let job = CrawlJob {
        url: "https://site.test/".to_string(),
        respect_robots_txt: false,
        concurrency: 2,
        ..CrawlJob::default()
    };
    let id = running_job(&store, JobSpec::Crawl(job.clone())).await;
    let outcome = engine_with(&store, Scraper::new(escalator))
        .run(id, &job, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, CrawlOutcome::Completed);

    let results = store.get_results(id).await.unwrap();
    assert_eq!(paths(&results), vec!["/", "/boom", "/fine"]);
    let boom = results.iter().find(|r| r.url.ends_with("/boom")).unwrap();
    assert!(!boom.success);
    assert_eq!(boom.error.as_deref(), Some("task panicked"));
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);
}

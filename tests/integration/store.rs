//! SQLite job store persistence

use harvest_engine::extract::{PageContent, PageMetadata};
use harvest_engine::jobs::{JobSpec, ScrapeJob};
use harvest_engine::scrape::ScrapeOptions;
use harvest_engine::storage::{Job, JobResult, JobStore, SqliteJobStore, StoreError};
use harvest_engine::JobStatus;
use tempfile::TempDir;

fn scrape_job(url: &str) -> Job {
    Job::new(
        "tester",
        JobSpec::Scrape(ScrapeJob {
            url: url.to_string(),
            options: ScrapeOptions::default(),
        }),
    )
}

fn content(title: &str) -> PageContent {
    PageContent {
        markdown: Some(format!("# {}", title)),
        metadata: PageMetadata {
            source_url: "https://example.com/".to_string(),
            status_code: 200,
            title: Some(title.to_string()),
            ..PageMetadata::default()
        },
        ..PageContent::default()
    }
}

#[tokio::test]
async fn test_job_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobs.db");

    let job = scrape_job("https://example.com/");
    {
        let store = SqliteJobStore::new(&db_path).unwrap();
        store.create_job(&job).await.unwrap();
        store.mark_running(job.id).await.unwrap();
        store
            .append_result(job.id, &JobResult::success("https://example.com/", content("Home")))
            .await
            .unwrap();
        store
            .append_result(job.id, &JobResult::failure("https://example.com/gone", "HTTP 404"))
            .await
            .unwrap();
        store.update_job_progress(job.id, 2, 2).await.unwrap();
        store
            .finalize_job(job.id, JobStatus::Completed, None)
            .await
            .unwrap();
    }

    let store = SqliteJobStore::new(&db_path).unwrap();
    let loaded = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.spec, job.spec);
    assert_eq!(loaded.user_id, "tester");
    assert_eq!(loaded.status, JobStatus::Completed);
    assert_eq!(loaded.completed_units, 2);
    assert_eq!(loaded.created_at, job.created_at);
    assert!(loaded.started_at.is_some());
    assert!(loaded.completed_at.is_some());

    let results = store.get_results(job.id).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content.as_ref().unwrap().metadata.title.as_deref(), Some("Home"));
    assert_eq!(results[1].error.as_deref(), Some("HTTP 404"));
}

#[tokio::test]
async fn test_terminal_jobs_reject_writes() {
    let dir = TempDir::new().unwrap();
    let store = SqliteJobStore::new(&dir.path().join("jobs.db")).unwrap();

    let job = scrape_job("https://example.com/");
    store.create_job(&job).await.unwrap();
    store.mark_running(job.id).await.unwrap();
    store
        .finalize_job(job.id, JobStatus::Failed, Some("boom"))
        .await
        .unwrap();

    assert!(matches!(
        store.mark_running(job.id).await,
        Err(StoreError::InvalidTransition { .. })
    ));
    assert!(matches!(
        store
            .append_result(job.id, &JobResult::failure("https://example.com/", "late"))
            .await,
        Err(StoreError::JobFinalized(_))
    ));
    assert!(store
        .finalize_job(job.id, JobStatus::Completed, None)
        .await
        .is_err());

    let loaded = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_unfinished_jobs_listed_after_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobs.db");

    let pending = scrape_job("https://example.com/pending");
    let running = scrape_job("https://example.com/running");
    let done = scrape_job("https://example.com/done");
    {
        let store = SqliteJobStore::new(&db_path).unwrap();
        for job in [&pending, &running, &done] {
            store.create_job(job).await.unwrap();
        }
        store.mark_running(running.id).await.unwrap();
        store
            .append_result(running.id, &JobResult::failure("https://example.com/running", "partial"))
            .await
            .unwrap();
        store.mark_running(done.id).await.unwrap();
        store
            .finalize_job(done.id, JobStatus::Completed, None)
            .await
            .unwrap();
    }

    let store = SqliteJobStore::new(&db_path).unwrap();
    let mut unfinished: Vec<_> = store
        .list_unfinished()
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.id)
        .collect();
    unfinished.sort();
    let mut expected = vec![pending.id, running.id];
    expected.sort();
    assert_eq!(unfinished, expected);

    store.reset_results(running.id).await.unwrap();
    assert!(store.get_results(running.id).await.unwrap().is_empty());
    assert_eq!(
        store.get_job(running.id).await.unwrap().unwrap().status,
        JobStatus::Running
    );
}

#[tokio::test]
async fn test_missing_job() {
    let store = SqliteJobStore::new_in_memory().unwrap();
    let job = scrape_job("https://example.com/");

    assert!(store.get_job(job.id).await.unwrap().is_none());
    assert!(matches!(
        store.mark_running(job.id).await,
        Err(StoreError::JobNotFound(_))
    ));
}

//! End-to-end crawl execution against a scripted extractor.

#[allow(dead_code)]
mod helpers;

use dashmap::DashMap;
use helpers::{FakeExtractor, make_candidate};
use newsroom::config::CrawlerConfig;
use newsroom::crawler::worker::Worker;
use newsroom::data::jobs::{self, NewJob};
use newsroom::data::models::{JobStatus, JobType};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

fn make_worker(pool: &PgPool, extractor: Arc<FakeExtractor>) -> Worker {
    Worker::new(
        0,
        pool.clone(),
        extractor,
        CrawlerConfig::default(),
        Arc::new(DashMap::new()),
    )
}

async fn enqueue(pool: &PgPool, category_id: Uuid) -> Uuid {
    let job = jobs::create_job(
        &NewJob {
            category_id,
            priority: 0,
            job_type: JobType::OnDemand,
            correlation_id: None,
            metadata: None,
        },
        pool,
    )
    .await
    .unwrap();
    job.id
}

#[sqlx::test]
async fn crawl_saves_matching_articles(pool: PgPool) {
    let tech = helpers::insert_category(&pool, "Tech", &["python", "ai"], &[], true).await;
    let job_id = enqueue(&pool, tech).await;

    let extractor = Arc::new(
        FakeExtractor::new(vec![
            make_candidate("Python AI breakthrough", "https://example.com/1"),
            make_candidate("Gardening tips", "https://example.com/2"),
        ])
        .with_content("https://example.com/1", "Researchers built a new framework in Python.")
        .with_content("https://example.com/2", "How to prune roses."),
    );

    let worker = make_worker(&pool, extractor);
    let processed = worker.process_next().await.unwrap();
    assert_eq!(processed, Some(job_id));

    let job = jobs::get_job(job_id, &pool).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.articles_found, 2);
    assert_eq!(job.articles_saved, 2);

    // The matching article carries full relevance, the other zero.
    let (relevance,): (f64,) =
        sqlx::query_as("SELECT relevance_score FROM articles WHERE source_url = $1")
            .bind("https://example.com/1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(relevance, 1.0);

    let (relevance,): (f64,) =
        sqlx::query_as("SELECT relevance_score FROM articles WHERE source_url = $1")
            .bind("https://example.com/2")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(relevance, 0.0);
}

#[sqlx::test]
async fn rerunning_the_same_crawl_is_idempotent(pool: PgPool) {
    let tech = helpers::insert_category(&pool, "Tech", &["python"], &[], true).await;

    let candidates = vec![
        make_candidate("Python one", "https://example.com/1"),
        make_candidate("Python two", "https://example.com/2"),
        make_candidate("Python three", "https://example.com/3"),
    ];

    for run in 0..2 {
        let job_id = enqueue(&pool, tech).await;
        let extractor = Arc::new(
            FakeExtractor::new(candidates.clone())
                .with_content("https://example.com/1", "python body one")
                .with_content("https://example.com/2", "python body two")
                .with_content("https://example.com/3", "python body three"),
        );
        let worker = make_worker(&pool, extractor);
        worker.process_next().await.unwrap();

        let job_filter = jobs::JobFilter {
            status: Some(JobStatus::Completed),
            category_id: None,
            limit: 10,
        };
        let completed = jobs::list_jobs(&job_filter, &pool).await.unwrap();
        assert_eq!(completed.len(), run + 1);
        // Both runs report all three as saved: inserted, then updated.
        assert_eq!(completed.iter().map(|j| j.articles_saved).min(), Some(3));
    }

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 3, "re-crawl must not duplicate articles");
}

#[sqlx::test]
async fn exclusion_keeps_category_out_of_links(pool: PgPool) {
    // Scenario: T matches in title and content; S is vetoed by its exclude
    // keyword even though "javascript" never matches anyway.
    let tech = helpers::insert_category(&pool, "Tech", &["python", "ai"], &[], true).await;
    let scripting =
        helpers::insert_category(&pool, "Scripting", &["javascript"], &["python"], true).await;

    let job_id = enqueue(&pool, tech).await;
    let extractor = Arc::new(
        FakeExtractor::new(vec![make_candidate(
            "Python AI breakthrough",
            "https://example.com/1",
        )])
        .with_content(
            "https://example.com/1",
            "Researchers built a new framework in Python.",
        ),
    );

    let worker = make_worker(&pool, extractor);
    worker.process_next().await.unwrap();

    let links: Vec<(Uuid, f64)> =
        sqlx::query_as("SELECT category_id, relevance_score FROM article_categories")
            .fetch_all(&pool)
            .await
            .unwrap();

    assert_eq!(links.len(), 1, "excluded category must not be linked");
    assert_eq!(links[0].0, tech);
    assert_eq!(links[0].1, 1.0);
    assert!(
        links.iter().all(|(id, _)| *id != scripting),
        "vetoed category leaked into links"
    );

    let job = jobs::get_job(job_id, &pool).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[sqlx::test]
async fn secondary_categories_are_linked_with_own_relevance(pool: PgPool) {
    let tech = helpers::insert_category(&pool, "Tech", &["python"], &[], true).await;
    let chains = helpers::insert_category(&pool, "Chains", &["blockchain"], &[], true).await;

    enqueue(&pool, tech).await;
    let extractor = Arc::new(
        FakeExtractor::new(vec![make_candidate(
            "Python update",
            "https://example.com/1",
        )])
        .with_content(
            "https://example.com/1",
            "The python release notes mention a new blockchain library.",
        ),
    );

    let worker = make_worker(&pool, extractor);
    worker.process_next().await.unwrap();

    let links: Vec<(Uuid, f64)> = sqlx::query_as(
        "SELECT category_id, relevance_score FROM article_categories ORDER BY relevance_score DESC",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(links.len(), 2);
    assert_eq!(links[0], (tech, 1.0));
    // "blockchain" appears in content only: 0.5
    assert_eq!(links[1], (chains, 0.5));
}

#[sqlx::test]
async fn inactive_category_completes_as_skipped(pool: PgPool) {
    let dormant = helpers::insert_category(&pool, "Dormant", &["python"], &[], false).await;
    let job_id = enqueue(&pool, dormant).await;

    let extractor = Arc::new(FakeExtractor::new(vec![make_candidate(
        "Python",
        "https://example.com/1",
    )]));
    let worker = make_worker(&pool, extractor);
    worker.process_next().await.unwrap();

    let job = jobs::get_job(job_id, &pool).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "skip is not an error");
    assert_eq!(job.articles_found, 0);
    assert_eq!(job.articles_saved, 0);
}

#[sqlx::test]
async fn zero_max_results_completes_empty(pool: PgPool) {
    let tech = helpers::insert_category(&pool, "Tech", &["python"], &[], true).await;
    let job = jobs::create_job(
        &NewJob {
            category_id: tech,
            priority: 0,
            job_type: JobType::OnDemand,
            correlation_id: None,
            metadata: jobs::window::to_metadata(None, None, Some(0), None),
        },
        &pool,
    )
    .await
    .unwrap();

    let extractor = Arc::new(FakeExtractor::new(vec![make_candidate(
        "Python",
        "https://example.com/1",
    )]));
    let worker = make_worker(&pool, extractor.clone());
    worker.process_next().await.unwrap();

    let job = jobs::get_job(job.id, &pool).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.articles_found, 0);
    assert_eq!(job.articles_saved, 0);
    assert_eq!(
        extractor.search_calls.load(std::sync::atomic::Ordering::SeqCst),
        0,
        "a zero budget never reaches the provider"
    );
}

#[sqlx::test]
async fn rate_limited_search_requeues_with_backoff(pool: PgPool) {
    let tech = helpers::insert_category(&pool, "Tech", &["python"], &[], true).await;
    let job_id = enqueue(&pool, tech).await;

    let worker = make_worker(&pool, Arc::new(FakeExtractor::rate_limited()));
    worker.process_next().await.unwrap();

    let job = jobs::get_job(job_id, &pool).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending, "retryable failure requeues");
    assert_eq!(job.retry_count, 1);
    assert!(job.started_at.is_none());
    assert!(job.execute_at > job.created_at, "retry must be deferred");
}

#[sqlx::test]
async fn retries_exhaust_into_failed(pool: PgPool) {
    let tech = helpers::insert_category(&pool, "Tech", &["python"], &[], true).await;
    let job_id = enqueue(&pool, tech).await;

    // Pretend two attempts already happened.
    sqlx::query("UPDATE crawl_jobs SET retry_count = 2 WHERE id = $1")
        .bind(job_id)
        .execute(&pool)
        .await
        .unwrap();

    let worker = make_worker(&pool, Arc::new(FakeExtractor::rate_limited()));
    worker.process_next().await.unwrap();

    let job = jobs::get_job(job_id, &pool).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed, "attempt cap reached");
    assert!(job.error_message.is_some());
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsroom::data::models::{JobStatus, JobType};
use newsroom::extract::{Candidate, ExtractError, ExtractedContent, Extractor, SearchRequest};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Insert a category row directly via SQL, returning the generated ID.
pub async fn insert_category(
    pool: &PgPool,
    name: &str,
    keywords: &[&str],
    exclude_keywords: &[&str],
    is_active: bool,
) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO categories (name, keywords, exclude_keywords, language, country, is_active)
         VALUES ($1, $2, $3, 'en', 'US', $4)
         RETURNING id",
    )
    .bind(name)
    .bind(serde_json::json!(keywords))
    .bind(serde_json::json!(exclude_keywords))
    .bind(is_active)
    .fetch_one(pool)
    .await
    .expect("insert_category failed");

    id
}

/// Enable a schedule on an existing category with a given next-run time.
pub async fn enable_schedule(
    pool: &PgPool,
    category_id: Uuid,
    interval_minutes: i32,
    next_run: DateTime<Utc>,
) {
    sqlx::query(
        "UPDATE categories SET schedule_enabled = TRUE, schedule_interval_minutes = $2,
         next_scheduled_run_at = $3 WHERE id = $1",
    )
    .bind(category_id)
    .bind(interval_minutes)
    .bind(next_run)
    .execute(pool)
    .await
    .expect("enable_schedule failed");
}

/// Insert a crawl job row in the given status, returning the generated ID.
///
/// Timing stamps are filled to satisfy the status consistency constraints.
pub async fn insert_job(
    pool: &PgPool,
    category_id: Uuid,
    status: JobStatus,
    priority: i32,
    retry_count: i32,
) -> Uuid {
    let now = Utc::now();
    let started_at = match status {
        JobStatus::Pending => None,
        _ => Some(now),
    };
    let completed_at = match status {
        JobStatus::Completed | JobStatus::Failed => Some(now),
        _ => None,
    };

    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO crawl_jobs (category_id, status, job_type, priority, retry_count,
                                 started_at, completed_at, external_task_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id",
    )
    .bind(category_id)
    .bind(status)
    .bind(JobType::OnDemand)
    .bind(priority)
    .bind(retry_count)
    .bind(started_at)
    .bind(completed_at)
    .bind(Uuid::new_v4().to_string())
    .fetch_one(pool)
    .await
    .expect("insert_job failed");

    id
}

/// Backdate a running job's started_at by the given number of seconds.
pub async fn backdate_job_start(pool: &PgPool, job_id: Uuid, seconds: i64) {
    sqlx::query(
        "UPDATE crawl_jobs SET started_at = NOW() - make_interval(secs => $2::double precision)
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(seconds)
    .execute(pool)
    .await
    .expect("backdate_job_start failed");
}

/// Insert an article tracked by a job, linked to the given categories at
/// relevance 1.0. Returns the article ID.
pub async fn insert_article_for_job(
    pool: &PgPool,
    title: &str,
    source_url: &str,
    crawl_job_id: Option<Uuid>,
    category_ids: &[Uuid],
) -> Uuid {
    let url_hash = newsroom::matching::hash::url_hash(source_url);
    let (article_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO articles (title, source_url, url_hash, crawl_job_id)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(title)
    .bind(source_url)
    .bind(url_hash)
    .bind(crawl_job_id)
    .fetch_one(pool)
    .await
    .expect("insert_article_for_job failed");

    for category_id in category_ids {
        sqlx::query(
            "INSERT INTO article_categories (article_id, category_id, relevance_score)
             VALUES ($1, $2, 1.0)",
        )
        .bind(article_id)
        .bind(category_id)
        .execute(pool)
        .await
        .expect("insert article link failed");
    }

    article_id
}

/// Build a search candidate with sensible defaults.
pub fn make_candidate(title: &str, url: &str) -> Candidate {
    Candidate {
        title: title.to_owned(),
        source_url: url.to_owned(),
        publish_date: Some(Utc::now()),
        snippet: None,
    }
}

/// A scripted extractor for worker tests.
///
/// Returns a fixed candidate list for every search and per-URL content for
/// extraction. Optionally fails the search with a rate limit.
pub struct FakeExtractor {
    pub candidates: Vec<Candidate>,
    pub content_by_url: Mutex<HashMap<String, String>>,
    pub rate_limit_search: bool,
    pub search_calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            content_by_url: Mutex::new(HashMap::new()),
            rate_limit_search: false,
            search_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_content(self, url: &str, content: &str) -> Self {
        self.content_by_url
            .lock()
            .unwrap()
            .insert(url.to_owned(), content.to_owned());
        self
    }

    pub fn rate_limited() -> Self {
        Self {
            candidates: Vec::new(),
            content_by_url: Mutex::new(HashMap::new()),
            rate_limit_search: true,
            search_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, ExtractError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.rate_limit_search {
            return Err(ExtractError::RateLimited {
                retry_after: Some(std::time::Duration::from_secs(30)),
            });
        }
        let mut results = self.candidates.clone();
        results.truncate(request.max_results as usize);
        Ok(results)
    }

    async fn extract(&self, candidate: &Candidate) -> Result<ExtractedContent, ExtractError> {
        let content = self
            .content_by_url
            .lock()
            .unwrap()
            .get(&candidate.source_url)
            .cloned();
        Ok(ExtractedContent {
            content,
            author: None,
            image_url: None,
            publish_date: None,
        })
    }
}

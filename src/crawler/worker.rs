//! Crawl execution: one worker claims and runs one job at a time.
//!
//! Each worker runs in its own task and polls the store for runnable jobs.
//! A claimed job is executed end-to-end: build the query, discover
//! candidates, extract with bounded concurrency, score, link, upsert, then
//! transition the job to a terminal state (or requeue it per the retry
//! discipline).

use crate::config::CrawlerConfig;
use crate::crawler::queues::TaskQueue;
use crate::crawler::retry;
use crate::data::models::{ArticleCandidate, Category, CrawlJob, UpsertOutcome};
use crate::data::{articles, categories, jobs};
use crate::error::{CoreError, Result};
use crate::extract::{Candidate, ExtractError, ExtractedContent, Extractor, SearchRequest};
use crate::matching::{keywords, linker};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use governor::DefaultDirectRateLimiter;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Consecutive extraction failures that escalate into a job-level
/// external-service error.
const MAX_CONSECUTIVE_EXTRACT_FAILURES: usize = 5;

/// Poll delay when the queue is empty.
const IDLE_POLL_DELAY: Duration = Duration::from_secs(5);

/// Result counts for a finished crawl.
struct CrawlOutcome {
    articles_found: i32,
    articles_saved: i32,
    note: Option<String>,
}

impl CrawlOutcome {
    fn skipped(note: impl Into<String>) -> Self {
        CrawlOutcome {
            articles_found: 0,
            articles_saved: 0,
            note: Some(note.into()),
        }
    }
}

/// A single worker instance.
pub struct Worker {
    id: usize, // For logging purposes
    db_pool: PgPool,
    extractor: Arc<dyn Extractor>,
    config: CrawlerConfig,
    cancellations: Arc<DashMap<Uuid, CancellationToken>>,
    crawl_limiter: DefaultDirectRateLimiter,
}

impl Worker {
    pub fn new(
        id: usize,
        db_pool: PgPool,
        extractor: Arc<dyn Extractor>,
        config: CrawlerConfig,
        cancellations: Arc<DashMap<Uuid, CancellationToken>>,
    ) -> Self {
        let crawl_limiter = TaskQueue::Crawl.limiter(config.crawl_rate_limit_per_minute);
        Self {
            id,
            db_pool,
            extractor,
            config,
            cancellations,
            crawl_limiter,
        }
    }

    /// Runs the worker's main loop until shutdown.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            worker_id = self.id,
            queue = TaskQueue::Crawl.name(),
            "worker started"
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(worker_id = self.id, "worker received shutdown signal");
                    break;
                }
                _ = self.crawl_limiter.until_ready() => {}
            }

            match self.process_next().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!(worker_id = self.id, "worker received shutdown signal");
                            break;
                        }
                        _ = time::sleep(IDLE_POLL_DELAY) => {}
                    }
                }
                Err(e) => {
                    warn!(worker_id = self.id, error = ?e, "failed to claim job");
                    time::sleep(Duration::from_secs(10)).await;
                }
            }
        }
        info!(worker_id = self.id, "worker exiting");
    }

    /// Claim and execute at most one job. Returns the processed job's id, or
    /// `None` when the queue had nothing runnable.
    pub async fn process_next(&self) -> Result<Option<Uuid>> {
        match jobs::claim_next_pending(&self.db_pool).await? {
            Some(job) => {
                let job_id = job.id;
                debug!(worker_id = self.id, %job_id, "processing job");
                self.process_job(job).await;
                Ok(Some(job_id))
            }
            None => Ok(None),
        }
    }

    /// Execute a claimed (already running) job and drive it to a terminal
    /// state or a retry.
    async fn process_job(&self, job: CrawlJob) {
        let job_id = job.id;
        let cancel = CancellationToken::new();
        self.cancellations.insert(job_id, cancel.clone());

        let started = std::time::Instant::now();
        let result = tokio::select! {
            result = time::timeout(
                self.config.job_execution_timeout,
                self.execute_crawl(&job, &cancel),
            ) => result.map_err(|_| CoreError::Timeout).and_then(|r| r),
            _ = cancel.cancelled() => Err(CoreError::StateViolation("cancelled".into())),
        };

        self.cancellations.remove(&job_id);

        match result {
            Ok(outcome) => {
                info!(
                    worker_id = self.id,
                    %job_id,
                    articles_found = outcome.articles_found,
                    articles_saved = outcome.articles_saved,
                    duration = format!("{:.2?}", started.elapsed()),
                    "job completed"
                );
                if let Err(e) = jobs::complete_job(
                    job_id,
                    outcome.articles_found,
                    outcome.articles_saved,
                    outcome.note.as_deref(),
                    &self.db_pool,
                )
                .await
                {
                    error!(worker_id = self.id, %job_id, error = ?e, "failed to record completion");
                }
            }
            Err(e) => self.handle_failure(&job, e).await,
        }
    }

    /// Apply the retry discipline to a failed job.
    async fn handle_failure(&self, job: &CrawlJob, err: CoreError) {
        let job_id = job.id;
        let kind = err.kind();
        let message = if matches!(err, CoreError::Timeout) {
            "timeout".to_string()
        } else {
            err.to_string()
        };

        let attempts_so_far = job.retry_count as u32 + 1;
        let retryable = kind.is_retryable() && attempts_so_far < retry::MAX_CRAWL_ATTEMPTS;

        if retryable {
            let delay = retry::backoff(kind, job.retry_count as u32, err.retry_after())
                .map(retry::with_jitter)
                .unwrap_or(Duration::from_secs(60));

            warn!(
                worker_id = self.id,
                %job_id,
                error_kind = kind.as_str(),
                error = %message,
                retry_in = format!("{delay:.2?}"),
                "job failed, scheduling retry"
            );

            let chrono_delay = ChronoDuration::from_std(delay)
                .unwrap_or_else(|_| ChronoDuration::seconds(60));
            if let Err(e) =
                jobs::schedule_retry(job_id, chrono_delay, &message, &self.db_pool).await
            {
                error!(worker_id = self.id, %job_id, error = ?e, "failed to schedule retry");
            }
        } else {
            error!(
                worker_id = self.id,
                %job_id,
                error_kind = kind.as_str(),
                error = %message,
                attempts = attempts_so_far,
                "job failed terminally"
            );
            if let Err(e) = jobs::fail_job(job_id, &message, &self.db_pool).await {
                error!(worker_id = self.id, %job_id, error = ?e, "failed to record failure");
            }
        }
    }

    /// The crawl body: everything between running and terminal.
    async fn execute_crawl(
        &self,
        job: &CrawlJob,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome> {
        let category = match categories::get_category(job.category_id, &self.db_pool).await {
            Ok(category) => category,
            Err(CoreError::NotFound { .. }) => {
                return Ok(CrawlOutcome::skipped("category missing, job skipped"));
            }
            Err(e) => return Err(e),
        };
        if !category.is_active {
            return Ok(CrawlOutcome::skipped(format!(
                "category '{}' is inactive, job skipped",
                category.name
            )));
        }

        let max_results = match self.effective_max_results(job) {
            Some(max) => max,
            None => return Ok(CrawlOutcome::skipped("max_results is zero")),
        };

        let now = Utc::now();
        let Some((start_date, end_date)) = effective_window(job, &category, now) else {
            return Ok(CrawlOutcome::skipped("empty date window"));
        };

        let query =
            keywords::build_query_with_exclusions(&category.keywords, &category.exclude_keywords)?;

        // Read-only category snapshot held for the duration of this job.
        let all_active = categories::get_active_categories(&self.db_pool).await?;
        let other_active: Vec<Category> = all_active
            .into_iter()
            .filter(|c| c.id != category.id)
            .collect();

        let request = SearchRequest {
            query,
            language: category.language.clone(),
            country: category.country.clone(),
            start_date,
            end_date,
            max_results,
        };

        let candidates = self.extractor.search(&request).await.map_err(CoreError::from)?;
        let articles_found = candidates.len() as i32;
        debug!(
            worker_id = self.id,
            job_id = %job.id,
            category = %category.name,
            candidates = candidates.len(),
            "search complete"
        );

        let mut articles_saved = 0i32;
        let mut dropped = 0usize;
        let mut consecutive_failures = 0usize;

        // Extraction runs in batches bounded by the extractor pool budget;
        // cancellation is observed between batches and between candidates.
        for batch in candidates.chunks(self.config.extractor_concurrency()) {
            if cancel.is_cancelled() {
                return Err(CoreError::StateViolation("cancelled".into()));
            }

            let extractions = futures::future::join_all(
                batch.iter().map(|candidate| self.extractor.extract(candidate)),
            )
            .await;

            for (candidate, extraction) in batch.iter().zip(extractions) {
                if cancel.is_cancelled() {
                    return Err(CoreError::StateViolation("cancelled".into()));
                }

                let content = match extraction {
                    Ok(content) => {
                        consecutive_failures = 0;
                        content
                    }
                    Err(ExtractError::RateLimited { retry_after }) => {
                        return Err(CoreError::RateLimited { retry_after });
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        dropped += 1;
                        debug!(
                            worker_id = self.id,
                            url = %candidate.source_url,
                            error = %e,
                            "candidate extraction failed, dropping"
                        );
                        if consecutive_failures >= MAX_CONSECUTIVE_EXTRACT_FAILURES {
                            return Err(CoreError::ExternalService(format!(
                                "{consecutive_failures} consecutive extraction failures"
                            )));
                        }
                        continue;
                    }
                };

                match self
                    .save_candidate(job, &category, &other_active, candidate, content)
                    .await
                {
                    Ok(_) => articles_saved += 1,
                    Err(e @ CoreError::Database(_)) => return Err(e),
                    Err(e) => {
                        dropped += 1;
                        warn!(
                            worker_id = self.id,
                            url = %candidate.source_url,
                            error = %e,
                            "failed to save candidate"
                        );
                    }
                }
            }
        }

        if dropped > 0 {
            debug!(worker_id = self.id, job_id = %job.id, dropped, "candidates dropped");
        }

        Ok(CrawlOutcome {
            articles_found,
            articles_saved,
            note: None,
        })
    }

    /// Score, link, and upsert one fully-extracted candidate.
    async fn save_candidate(
        &self,
        job: &CrawlJob,
        primary: &Category,
        other_active: &[Category],
        candidate: &Candidate,
        extracted: ExtractedContent,
    ) -> Result<UpsertOutcome> {
        let content = extracted.content.or_else(|| candidate.snippet.clone());

        let matched = keywords::match_keywords(&candidate.title, content.as_deref(), &primary.keywords);
        let relevance = keywords::relevance(&candidate.title, content.as_deref(), &matched);

        let mut links = vec![linker::CategoryMatch {
            category_id: primary.id,
            relevance_score: relevance,
        }];
        links.extend(linker::find_matches(
            &candidate.title,
            content.as_deref(),
            other_active,
            linker::DEFAULT_MIN_RELEVANCE,
        ));

        let article = ArticleCandidate {
            title: candidate.title.clone(),
            content,
            author: extracted.author,
            publish_date: extracted.publish_date.or(candidate.publish_date),
            source_url: candidate.source_url.clone(),
            image_url: extracted.image_url,
            keywords_matched: matched,
            relevance_score: relevance,
            crawl_job_id: Some(job.id),
        };

        articles::upsert_article_with_links(&article, &links, &self.db_pool).await
    }

    /// The requested result budget: metadata override clamped to the hard
    /// bound, or the configured default. `None` means zero was requested.
    fn effective_max_results(&self, job: &CrawlJob) -> Option<u32> {
        match jobs::window::parse_max_results(job.metadata.as_ref()) {
            Some(0) => None,
            Some(requested) => Some(requested.min(self.config.max_results_limit)),
            None => Some(self.config.default_max_results),
        }
    }
}

/// Intersect the job's explicit date window with the category's crawl-period
/// cap. Returns `None` when the intersection is empty.
fn effective_window(
    job: &CrawlJob,
    category: &Category,
    now: DateTime<Utc>,
) -> Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let job_start = jobs::window::parse_date(job.metadata.as_ref(), jobs::window::START_DATE_KEY);
    let job_end = jobs::window::parse_date(job.metadata.as_ref(), jobs::window::END_DATE_KEY);

    let period_start = category
        .crawl_period
        .as_deref()
        .and_then(crawl_period_duration)
        .map(|d| now - d);

    let start = match (job_start, period_start) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    let end = job_end;

    if let (Some(start), Some(end)) = (start, end)
        && start > end
    {
        return None;
    }
    Some((start, end))
}

/// Parse a crawl-period string (`{count}{unit}`, unit in h/d/w/m/y) into a
/// duration. Months are 30 days, years 365.
pub fn crawl_period_duration(period: &str) -> Option<ChronoDuration> {
    let (count_str, unit) = period.split_at(period.len().checked_sub(1)?);
    let count: i64 = count_str.parse().ok()?;
    match unit {
        "h" => Some(ChronoDuration::hours(count)),
        "d" => Some(ChronoDuration::days(count)),
        "w" => Some(ChronoDuration::weeks(count)),
        "m" => Some(ChronoDuration::days(count * 30)),
        "y" => Some(ChronoDuration::days(count * 365)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::{JobStatus, JobType};

    fn job_with_metadata(metadata: Option<serde_json::Value>) -> CrawlJob {
        CrawlJob {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            status: JobStatus::Running,
            job_type: JobType::OnDemand,
            priority: 0,
            retry_count: 0,
            external_task_id: None,
            correlation_id: None,
            metadata,
            started_at: Some(Utc::now()),
            completed_at: None,
            error_message: None,
            articles_found: 0,
            articles_saved: 0,
            execute_at: Utc::now(),
            locked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn category_with_period(period: Option<&str>) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: "Tech".into(),
            keywords: vec!["tech".into()],
            exclude_keywords: vec![],
            language: "en".into(),
            country: "US".into(),
            is_active: true,
            schedule_enabled: false,
            schedule_interval_minutes: None,
            last_scheduled_run_at: None,
            next_scheduled_run_at: None,
            crawl_period: period.map(|s| s.to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn crawl_period_units() {
        assert_eq!(crawl_period_duration("12h"), Some(ChronoDuration::hours(12)));
        assert_eq!(crawl_period_duration("7d"), Some(ChronoDuration::days(7)));
        assert_eq!(crawl_period_duration("2w"), Some(ChronoDuration::weeks(2)));
        assert_eq!(crawl_period_duration("3m"), Some(ChronoDuration::days(90)));
        assert_eq!(crawl_period_duration("1y"), Some(ChronoDuration::days(365)));
        assert_eq!(crawl_period_duration("x"), None);
        assert_eq!(crawl_period_duration(""), None);
    }

    #[test]
    fn window_intersects_job_dates_with_crawl_period() {
        let now = Utc::now();
        let job = job_with_metadata(jobs::window::to_metadata(
            Some(now - ChronoDuration::days(30)),
            Some(now),
            None,
            None,
        ));
        let category = category_with_period(Some("7d"));

        let (start, end) = effective_window(&job, &category, now).unwrap();
        // The crawl period is narrower than the job window, so it wins.
        assert_eq!(start.unwrap(), now - ChronoDuration::days(7));
        assert_eq!(end.unwrap(), now);
    }

    #[test]
    fn window_empty_when_period_starts_after_job_end() {
        let now = Utc::now();
        let job = job_with_metadata(jobs::window::to_metadata(
            Some(now - ChronoDuration::days(60)),
            Some(now - ChronoDuration::days(30)),
            None,
            None,
        ));
        let category = category_with_period(Some("1d"));

        assert!(effective_window(&job, &category, now).is_none());
    }

    #[test]
    fn window_unbounded_without_inputs() {
        let now = Utc::now();
        let job = job_with_metadata(None);
        let category = category_with_period(None);

        let (start, end) = effective_window(&job, &category, now).unwrap();
        assert!(start.is_none());
        assert!(end.is_none());
    }
}

//! Crawl job queue operations.
//!
//! Status transitions are serialized per job by conditional updates: every
//! transition carries a `WHERE status = ...` guard so two workers can never
//! move the same job twice.

use crate::data::models::{CrawlJob, DeletionImpact, JobStatus, JobType};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

/// Error message stamped on jobs reset by the stuck-job sweep.
pub const STUCK_JOB_ERROR: &str = "job exceeded stuck threshold and was reset";

/// Maximum priority; on-demand execute requests use this.
pub const MAX_PRIORITY: i32 = 10;

/// Parameters for creating a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub category_id: Uuid,
    pub priority: i32,
    pub job_type: JobType,
    pub correlation_id: Option<String>,
    pub metadata: Option<Value>,
}

/// Insert a pending job and return the full row.
///
/// A missing category surfaces as `not_found` via the foreign key.
pub async fn create_job(new_job: &NewJob, pool: &PgPool) -> Result<CrawlJob> {
    if !(0..=MAX_PRIORITY).contains(&new_job.priority) {
        return Err(CoreError::Validation(format!(
            "priority must be between 0 and {MAX_PRIORITY}"
        )));
    }

    let result = sqlx::query_as::<_, CrawlJob>(
        r#"
        INSERT INTO crawl_jobs (category_id, priority, job_type, correlation_id, metadata)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(new_job.category_id)
    .bind(new_job.priority)
    .bind(new_job.job_type)
    .bind(&new_job.correlation_id)
    .bind(&new_job.metadata)
    .fetch_one(pool)
    .await;

    match result {
        Ok(job) => Ok(job),
        Err(sqlx::Error::Database(db_err))
            if db_err.constraint() == Some("crawl_jobs_category_id_fkey") =>
        {
            Err(CoreError::not_found("category", new_job.category_id))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get_job(job_id: Uuid, pool: &PgPool) -> Result<CrawlJob> {
    sqlx::query_as::<_, CrawlJob>("SELECT * FROM crawl_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::not_found("job", job_id))
}

pub async fn get_job_by_external_task_id(task_id: &str, pool: &PgPool) -> Result<Option<CrawlJob>> {
    let job = sqlx::query_as::<_, CrawlJob>("SELECT * FROM crawl_jobs WHERE external_task_id = $1")
        .bind(task_id)
        .fetch_optional(pool)
        .await?;
    Ok(job)
}

/// Filters for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub category_id: Option<Uuid>,
    pub limit: i64,
}

/// List jobs.
///
/// Active work (pending/running) is ordered by `(priority DESC, created_at
/// ASC)`; history is ordered by `created_at DESC`.
pub async fn list_jobs(filter: &JobFilter, pool: &PgPool) -> Result<Vec<CrawlJob>> {
    let limit = if filter.limit <= 0 { 100 } else { filter.limit };
    let active_ordering = matches!(
        filter.status,
        Some(JobStatus::Pending) | Some(JobStatus::Running)
    );
    let order = if active_ordering {
        "priority DESC, created_at ASC"
    } else {
        "created_at DESC"
    };

    let query = format!(
        "SELECT * FROM crawl_jobs \
         WHERE ($1::job_status IS NULL OR status = $1) \
         AND ($2::uuid IS NULL OR category_id = $2) \
         ORDER BY {order} LIMIT $3"
    );

    let rows = sqlx::query_as::<_, CrawlJob>(&query)
        .bind(filter.status)
        .bind(filter.category_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Atomically claim the next runnable job and transition it to running.
///
/// Uses `FOR UPDATE SKIP LOCKED` so multiple workers can poll concurrently.
/// The claimed job comes back already stamped with `started_at` and a fresh
/// `external_task_id`.
pub async fn claim_next_pending(pool: &PgPool) -> Result<Option<CrawlJob>> {
    let mut tx = pool.begin().await?;

    let job = sqlx::query_as::<_, CrawlJob>(
        "SELECT * FROM crawl_jobs \
         WHERE status = 'pending' AND execute_at <= NOW() \
         ORDER BY priority DESC, created_at ASC \
         LIMIT 1 \
         FOR UPDATE SKIP LOCKED",
    )
    .fetch_optional(&mut *tx)
    .await?;

    let claimed = if let Some(job) = job {
        let external_task_id = Uuid::new_v4().to_string();
        let updated = sqlx::query_as::<_, CrawlJob>(
            "UPDATE crawl_jobs \
             SET status = 'running', started_at = NOW(), locked_at = NOW(), \
                 external_task_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING *",
        )
        .bind(job.id)
        .bind(&external_task_id)
        .fetch_one(&mut *tx)
        .await?;
        Some(updated)
    } else {
        None
    };

    tx.commit().await?;
    Ok(claimed)
}

/// Transition running -> completed with result counts.
pub async fn complete_job(
    job_id: Uuid,
    articles_found: i32,
    articles_saved: i32,
    error_message: Option<&str>,
    pool: &PgPool,
) -> Result<CrawlJob> {
    sqlx::query_as::<_, CrawlJob>(
        "UPDATE crawl_jobs \
         SET status = 'completed', completed_at = NOW(), locked_at = NULL, \
             articles_found = $2, articles_saved = $3, error_message = $4, updated_at = NOW() \
         WHERE id = $1 AND status = 'running' \
         RETURNING *",
    )
    .bind(job_id)
    .bind(articles_found)
    .bind(articles_saved)
    .bind(error_message)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::StateViolation(format!("job {job_id} is not running")))
}

/// Transition running -> failed with an error summary.
pub async fn fail_job(job_id: Uuid, error_message: &str, pool: &PgPool) -> Result<CrawlJob> {
    sqlx::query_as::<_, CrawlJob>(
        "UPDATE crawl_jobs \
         SET status = 'failed', completed_at = NOW(), locked_at = NULL, \
             error_message = $2, updated_at = NOW() \
         WHERE id = $1 AND status = 'running' \
         RETURNING *",
    )
    .bind(job_id)
    .bind(error_message)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::StateViolation(format!("job {job_id} is not running")))
}

/// Requeue a running job for a retry attempt.
///
/// Resets the job to pending (clearing `started_at` to keep the status
/// invariants), bumps `retry_count`, and defers eligibility by `delay`.
pub async fn schedule_retry(
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
    pool: &PgPool,
) -> Result<CrawlJob> {
    let execute_at = Utc::now() + delay;
    sqlx::query_as::<_, CrawlJob>(
        "UPDATE crawl_jobs \
         SET status = 'pending', started_at = NULL, completed_at = NULL, locked_at = NULL, \
             external_task_id = NULL, retry_count = LEAST(retry_count + 1, 10), \
             error_message = $2, execute_at = $3, updated_at = NOW() \
         WHERE id = $1 AND status = 'running' \
         RETURNING *",
    )
    .bind(job_id)
    .bind(error_message)
    .bind(execute_at)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::StateViolation(format!("job {job_id} is not running")))
}

/// Change a job's priority. Rejected while the job is running.
pub async fn update_priority(job_id: Uuid, priority: i32, pool: &PgPool) -> Result<CrawlJob> {
    if !(0..=MAX_PRIORITY).contains(&priority) {
        return Err(CoreError::Validation(format!(
            "priority must be between 0 and {MAX_PRIORITY}"
        )));
    }

    let job = get_job(job_id, pool).await?;
    if job.status == JobStatus::Running {
        return Err(CoreError::StateViolation(
            "cannot update priority of a running job".into(),
        ));
    }

    sqlx::query_as::<_, CrawlJob>(
        "UPDATE crawl_jobs SET priority = $2, updated_at = NOW() \
         WHERE id = $1 AND status != 'running' \
         RETURNING *",
    )
    .bind(job_id)
    .bind(priority)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::StateViolation("cannot update priority of a running job".into()))
}

/// Partial job update: priority, retry_count, metadata. Rejected on running jobs.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub priority: Option<i32>,
    pub retry_count: Option<i32>,
    pub metadata: Option<Value>,
}

pub async fn update_job(job_id: Uuid, update: &JobUpdate, pool: &PgPool) -> Result<CrawlJob> {
    if let Some(priority) = update.priority
        && !(0..=MAX_PRIORITY).contains(&priority)
    {
        return Err(CoreError::Validation(format!(
            "priority must be between 0 and {MAX_PRIORITY}"
        )));
    }
    if let Some(retry_count) = update.retry_count
        && !(0..=10).contains(&retry_count)
    {
        return Err(CoreError::Validation(
            "retry_count must be between 0 and 10".into(),
        ));
    }

    let job = get_job(job_id, pool).await?;
    if job.status == JobStatus::Running {
        return Err(CoreError::StateViolation(
            "cannot update a running job".into(),
        ));
    }

    sqlx::query_as::<_, CrawlJob>(
        "UPDATE crawl_jobs \
         SET priority = COALESCE($2, priority), \
             retry_count = COALESCE($3, retry_count), \
             metadata = COALESCE($4, metadata), \
             updated_at = NOW() \
         WHERE id = $1 AND status != 'running' \
         RETURNING *",
    )
    .bind(job_id)
    .bind(update.priority)
    .bind(update.retry_count)
    .bind(&update.metadata)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::StateViolation("cannot update a running job".into()))
}

/// Running jobs whose `started_at` is strictly older than the threshold.
pub async fn find_stuck_jobs(threshold_hours: i64, pool: &PgPool) -> Result<Vec<CrawlJob>> {
    let cutoff = Utc::now() - Duration::hours(threshold_hours);
    let rows = sqlx::query_as::<_, CrawlJob>(
        "SELECT * FROM crawl_jobs \
         WHERE status = 'running' AND started_at < $1 \
         ORDER BY started_at ASC",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fail every stuck running job, bumping its retry count.
///
/// A job at exactly the threshold is left alone; reset requires
/// `started_at < now - threshold`.
pub async fn reset_stuck_jobs(threshold_hours: i64, pool: &PgPool) -> Result<u64> {
    let cutoff = Utc::now() - Duration::hours(threshold_hours);
    let result = sqlx::query(
        "UPDATE crawl_jobs \
         SET status = 'failed', completed_at = NOW(), locked_at = NULL, \
             error_message = $2, retry_count = LEAST(retry_count + 1, 10), updated_at = NOW() \
         WHERE status = 'running' AND started_at < $1",
    )
    .bind(cutoff)
    .bind(STUCK_JOB_ERROR)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Delete terminal jobs older than `age_days`. Returns the number removed.
pub async fn cleanup_old_jobs(age_days: i64, pool: &PgPool) -> Result<u64> {
    let cutoff = Utc::now() - Duration::days(age_days);
    let result = sqlx::query(
        "DELETE FROM crawl_jobs \
         WHERE status IN ('completed', 'failed') AND created_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Delete a job, reporting the impact on tracked articles.
///
/// Running jobs require `force`. With `delete_articles`, only articles whose
/// sole retention was this job are removed: an article linked to a category
/// other than the job's own survives with `crawl_job_id` nulled.
pub async fn delete_job(
    job_id: Uuid,
    force: bool,
    delete_articles: bool,
    pool: &PgPool,
) -> Result<DeletionImpact> {
    let mut tx = pool.begin().await?;

    let job = sqlx::query_as::<_, CrawlJob>("SELECT * FROM crawl_jobs WHERE id = $1 FOR UPDATE")
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("job", job_id))?;

    let was_running = job.status == JobStatus::Running;
    if was_running && !force {
        return Err(CoreError::StateViolation(
            "cannot delete a running job without force".into(),
        ));
    }

    let (articles_affected,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM articles WHERE crawl_job_id = $1")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await?;

    let articles_deleted = if delete_articles {
        let result = sqlx::query(
            "DELETE FROM articles a \
             WHERE a.crawl_job_id = $1 \
             AND NOT EXISTS ( \
                 SELECT 1 FROM article_categories ac \
                 WHERE ac.article_id = a.id AND ac.category_id != $2 \
             )",
        )
        .bind(job_id)
        .bind(job.category_id)
        .execute(&mut *tx)
        .await?;
        result.rows_affected() as i64
    } else {
        0
    };

    // Dissociate whatever survives; the job row is about to go away.
    sqlx::query("UPDATE articles SET crawl_job_id = NULL, updated_at = NOW() WHERE crawl_job_id = $1")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM crawl_jobs WHERE id = $1")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        %job_id,
        articles_affected,
        articles_deleted,
        was_running,
        "job deleted"
    );

    Ok(DeletionImpact {
        articles_affected,
        articles_deleted,
        was_running,
    })
}

/// Jobs currently pending or running, for backlog health checks.
pub async fn count_active_jobs(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM crawl_jobs WHERE status IN ('pending', 'running')")
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Aggregate job statistics over a trailing window.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct JobStatistics {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub avg_duration_seconds: Option<f64>,
    pub total_articles_found: i64,
    pub total_articles_saved: i64,
}

pub async fn get_job_statistics(window_hours: i64, pool: &PgPool) -> Result<JobStatistics> {
    let since = Utc::now() - Duration::hours(window_hours);
    let stats = sqlx::query_as::<_, JobStatistics>(
        r#"
        SELECT
            COUNT(*)::BIGINT AS total,
            COUNT(*) FILTER (WHERE status = 'pending')::BIGINT AS pending,
            COUNT(*) FILTER (WHERE status = 'running')::BIGINT AS running,
            COUNT(*) FILTER (WHERE status = 'completed')::BIGINT AS completed,
            COUNT(*) FILTER (WHERE status = 'failed')::BIGINT AS failed,
            (AVG(EXTRACT(EPOCH FROM (completed_at - started_at)))
                FILTER (WHERE completed_at IS NOT NULL AND started_at IS NOT NULL))::FLOAT8
                AS avg_duration_seconds,
            COALESCE(SUM(articles_found), 0)::BIGINT AS total_articles_found,
            COALESCE(SUM(articles_saved), 0)::BIGINT AS total_articles_saved
        FROM crawl_jobs
        WHERE created_at >= $1
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(stats)
}

/// Log jobs left running by a previous process; the stuck-job sweep will
/// reclaim them once they pass the threshold.
pub async fn report_orphaned_jobs(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM crawl_jobs WHERE status = 'running'")
            .fetch_one(pool)
            .await?;
    if count > 0 {
        warn!(
            count,
            "found running jobs from a previous run; stuck-job sweep will reclaim them"
        );
    }
    Ok(count)
}

/// Date-window metadata attached to on-demand jobs.
///
/// Stored in the job's metadata map under fixed keys so the worker can
/// recover the operator-requested window.
pub mod window {
    use super::*;

    pub const START_DATE_KEY: &str = "start_date";
    pub const END_DATE_KEY: &str = "end_date";
    pub const MAX_RESULTS_KEY: &str = "max_results";

    pub fn to_metadata(
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        max_results: Option<u32>,
        extra: Option<Value>,
    ) -> Option<Value> {
        let mut map = match extra {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if let Some(start) = start_date {
            map.insert(START_DATE_KEY.into(), Value::String(start.to_rfc3339()));
        }
        if let Some(end) = end_date {
            map.insert(END_DATE_KEY.into(), Value::String(end.to_rfc3339()));
        }
        if let Some(max) = max_results {
            map.insert(MAX_RESULTS_KEY.into(), Value::from(max));
        }
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }

    pub fn parse_date(metadata: Option<&Value>, key: &str) -> Option<DateTime<Utc>> {
        metadata?
            .get(key)?
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn parse_max_results(metadata: Option<&Value>) -> Option<u32> {
        metadata?
            .get(MAX_RESULTS_KEY)?
            .as_u64()
            .map(|v| v as u32)
    }
}

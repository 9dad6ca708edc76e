//! Job endpoints.

use crate::data::jobs::{self, JobFilter, JobUpdate, NewJob};
use crate::data::models::{CrawlJob, JobStatus, JobType};
use crate::state::AppState;
use crate::web::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Maximum explicit date range on job creation, in days.
const MAX_DATE_RANGE_DAYS: i64 = 90;

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub category_id: Uuid,
    #[serde(default)]
    pub priority: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_results: Option<u32>,
    pub correlation_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Validate the explicit date window: end after start, and at most 90 days.
fn validate_date_range(
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> Result<(), ApiError> {
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end <= start {
            return Err(ApiError::unprocessable("end_date must be after start_date"));
        }
        let days = (end - start).num_days();
        if days > MAX_DATE_RANGE_DAYS {
            return Err(ApiError::unprocessable(format!(
                "Date range cannot exceed {MAX_DATE_RANGE_DAYS} days for on-demand crawls (got {days} days)"
            )));
        }
    }
    Ok(())
}

/// POST /jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CrawlJob>), ApiError> {
    validate_date_range(request.start_date, request.end_date)?;

    if let Some(max_results) = request.max_results
        && max_results > state.config.crawler.max_results_limit
    {
        return Err(ApiError::unprocessable(format!(
            "max_results cannot exceed {}",
            state.config.crawler.max_results_limit
        )));
    }

    let correlation_id = request
        .correlation_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let new_job = NewJob {
        category_id: request.category_id,
        priority: request.priority,
        job_type: JobType::OnDemand,
        correlation_id: Some(correlation_id.clone()),
        metadata: jobs::window::to_metadata(
            request.start_date,
            request.end_date,
            request.max_results,
            request.metadata,
        ),
    };

    let job = jobs::create_job(&new_job, &state.db_pool)
        .await
        .map_err(|e| ApiError::from(e).with_correlation_id(correlation_id))?;

    info!(job_id = %job.id, category_id = %job.category_id, "on-demand job created");
    Ok((StatusCode::CREATED, Json(job)))
}

#[derive(Deserialize)]
pub struct ListJobsParams {
    pub status: Option<JobStatus>,
    pub category_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<CrawlJob>,
    pub count: usize,
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<JobListResponse>, ApiError> {
    let filter = JobFilter {
        status: params.status,
        category_id: params.category_id,
        limit: params.limit.clamp(1, 500),
    };
    let jobs = jobs::list_jobs(&filter, &state.db_pool).await?;
    let count = jobs.len();
    Ok(Json(JobListResponse { jobs, count }))
}

#[derive(Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub category_id: Uuid,
    pub status: JobStatus,
    pub priority: i32,
    pub retry_count: i32,
    pub articles_found: i32,
    pub articles_saved: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub error_message: Option<String>,
    pub correlation_id: Option<String>,
}

/// GET /jobs/{id}/status
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = jobs::get_job(job_id, &state.db_pool).await?;
    Ok(Json(JobStatusResponse {
        job_id: job.id,
        category_id: job.category_id,
        status: job.status,
        priority: job.priority,
        retry_count: job.retry_count,
        articles_found: job.articles_found,
        articles_saved: job.articles_saved,
        duration_seconds: job.duration_seconds(),
        started_at: job.started_at,
        completed_at: job.completed_at,
        error_message: job.error_message,
        correlation_id: job.correlation_id,
    }))
}

#[derive(Deserialize)]
pub struct PriorityRequest {
    pub priority: i32,
}

/// PATCH /jobs/{id}/priority
pub async fn update_priority(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<PriorityRequest>,
) -> Result<Json<CrawlJob>, ApiError> {
    let job = jobs::update_priority(job_id, request.priority, &state.db_pool).await?;
    Ok(Json(job))
}

#[derive(Deserialize)]
pub struct UpdateJobRequest {
    pub priority: Option<i32>,
    pub retry_count: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// PUT /jobs/{id}
pub async fn update_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<UpdateJobRequest>,
) -> Result<Json<CrawlJob>, ApiError> {
    let update = JobUpdate {
        priority: request.priority,
        retry_count: request.retry_count,
        metadata: request.metadata,
    };
    let job = jobs::update_job(job_id, &update, &state.db_pool).await?;
    Ok(Json(job))
}

#[derive(Deserialize)]
pub struct DeleteJobParams {
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub delete_articles: bool,
}

#[derive(Serialize)]
pub struct DeleteJobResponse {
    pub job_id: Uuid,
    pub articles_affected: i64,
    pub articles_deleted: i64,
    pub was_running: bool,
}

/// DELETE /jobs/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(params): Query<DeleteJobParams>,
) -> Result<Json<DeleteJobResponse>, ApiError> {
    // A forced delete of a running job stops the in-flight crawl first.
    if params.force
        && let Some(entry) = state.cancellations.get(&job_id)
    {
        entry.value().cancel();
    }

    let impact =
        jobs::delete_job(job_id, params.force, params.delete_articles, &state.db_pool).await?;

    Ok(Json(DeleteJobResponse {
        job_id,
        articles_affected: impact.articles_affected,
        articles_deleted: impact.articles_deleted,
        was_running: impact.was_running,
    }))
}

/// POST /jobs/{id}/execute
///
/// Clone an existing job as a new max-priority on-demand job.
pub async fn execute_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CrawlJob>, ApiError> {
    let source = jobs::get_job(job_id, &state.db_pool).await?;

    if source.status == JobStatus::Running {
        return Err(ApiError::bad_request("job is already running"));
    }

    let new_job = NewJob {
        category_id: source.category_id,
        priority: jobs::MAX_PRIORITY,
        job_type: JobType::OnDemand,
        correlation_id: Some(Uuid::new_v4().to_string()),
        metadata: source.metadata.clone(),
    };
    let job = jobs::create_job(&new_job, &state.db_pool).await?;

    info!(source_job_id = %job_id, job_id = %job.id, "job cloned for immediate execution");
    Ok(Json(job))
}

/// GET /jobs/stats
pub async fn job_stats(
    State(state): State<AppState>,
) -> Result<Json<jobs::JobStatistics>, ApiError> {
    let stats = jobs::get_job_statistics(24, &state.db_pool).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn window_within_ninety_days_passes() {
        assert!(
            validate_date_range(
                Some(date("2024-01-01T00:00:00Z")),
                Some(date("2024-03-01T00:00:00Z"))
            )
            .is_ok()
        );
        // One-sided and absent windows are fine too
        assert!(validate_date_range(Some(date("2024-01-01T00:00:00Z")), None).is_ok());
        assert!(validate_date_range(None, None).is_ok());
    }

    #[test]
    fn overlong_window_is_unprocessable() {
        let err = validate_date_range(
            Some(date("2024-01-01T00:00:00Z")),
            Some(date("2024-05-01T00:00:00Z")),
        )
        .unwrap_err();
        assert!(err.message.contains("cannot exceed 90 days"), "{}", err.message);
    }

    #[test]
    fn inverted_window_is_unprocessable() {
        let err = validate_date_range(
            Some(date("2024-02-01T00:00:00Z")),
            Some(date("2024-01-01T00:00:00Z")),
        )
        .unwrap_err();
        assert!(err.message.contains("after start_date"));
    }
}

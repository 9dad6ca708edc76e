//! Row models for the database schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A named collection of inclusion/exclusion keywords with an optional
/// recurring schedule and crawl-period cap.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[sqlx(json)]
    pub keywords: Vec<String>,
    #[sqlx(json)]
    pub exclude_keywords: Vec<String>,
    pub language: String,
    pub country: String,
    pub is_active: bool,
    pub schedule_enabled: bool,
    pub schedule_interval_minutes: Option<i32>,
    pub last_scheduled_run_at: Option<DateTime<Utc>>,
    pub next_scheduled_run_at: Option<DateTime<Utc>>,
    pub crawl_period: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The allowed scheduling cadences, in minutes.
pub const ALLOWED_SCHEDULE_INTERVALS: [i32; 4] = [1, 30, 60, 1440];

/// Execution state of a crawl job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// How a job was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Scheduled,
    OnDemand,
}

/// A single crawl attempt for one category.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub category_id: Uuid,
    pub status: JobStatus,
    pub job_type: JobType,
    pub priority: i32,
    pub retry_count: i32,
    pub external_task_id: Option<String>,
    pub correlation_id: Option<String>,
    pub metadata: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub articles_found: i32,
    pub articles_saved: i32,
    pub execute_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlJob {
    /// Job duration in seconds when both timing stamps are set.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some((completed - started).num_seconds()),
            _ => None,
        }
    }
}

/// A deduplicated news article.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub source_url: String,
    pub image_url: Option<String>,
    pub url_hash: String,
    pub content_hash: Option<String>,
    pub keywords_matched: Option<Vec<String>>,
    pub relevance_score: f64,
    pub last_seen: DateTime<Utc>,
    pub crawl_job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An article↔category association with per-association relevance.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ArticleCategoryLink {
    pub id: Uuid,
    pub article_id: Uuid,
    pub category_id: Uuid,
    pub relevance_score: f64,
    pub created_at: DateTime<Utc>,
}

/// A fully-extracted article candidate ready for upsert.
#[derive(Debug, Clone)]
pub struct ArticleCandidate {
    pub title: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub source_url: String,
    pub image_url: Option<String>,
    pub keywords_matched: Vec<String>,
    pub relevance_score: f64,
    pub crawl_job_id: Option<Uuid>,
}

/// Outcome of [`crate::data::articles::upsert_article_with_links`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Impact report returned by job deletion.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeletionImpact {
    pub articles_affected: i64,
    pub articles_deleted: i64,
    pub was_running: bool,
}

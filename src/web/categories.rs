//! Category endpoints.

use crate::data::categories::{self, CategoryFields};
use crate::data::models::Category;
use crate::state::AppState;
use crate::web::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub include_stats: bool,
}

#[derive(Serialize)]
pub struct CategoryResponse {
    #[serde(flatten)]
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_count: Option<i64>,
}

#[derive(Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<CategoryResponse>,
    pub count: usize,
}

/// GET /categories
pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<CategoryListResponse>, ApiError> {
    let rows = categories::list_categories(params.active_only, &state.db_pool).await?;

    let counts: HashMap<Uuid, i64> = if params.include_stats {
        categories::get_article_counts(&state.db_pool)
            .await?
            .into_iter()
            .map(|c| (c.category_id, c.article_count))
            .collect()
    } else {
        HashMap::new()
    };

    let categories: Vec<CategoryResponse> = rows
        .into_iter()
        .map(|category| {
            let article_count = params
                .include_stats
                .then(|| counts.get(&category.id).copied().unwrap_or(0));
            CategoryResponse {
                category,
                article_count,
            }
        })
        .collect();

    let count = categories.len();
    Ok(Json(CategoryListResponse { categories, count }))
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub crawl_period: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

fn default_true() -> bool {
    true
}

/// POST /categories
pub async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let fields = CategoryFields {
        name: request.name,
        keywords: request.keywords,
        exclude_keywords: request.exclude_keywords,
        language: request.language,
        country: request.country,
        is_active: request.is_active,
        crawl_period: request.crawl_period,
    };

    let category =
        categories::create_category(&fields, &state.config.limits, &state.db_pool).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /categories/{id}
pub async fn get_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
) -> Result<Json<Category>, ApiError> {
    let category = categories::get_category(category_id, &state.db_pool).await?;
    Ok(Json(category))
}

#[derive(Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub exclude_keywords: Option<Vec<String>>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub is_active: Option<bool>,
    /// Double-optional so the caller can clear the period with null.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub crawl_period: Option<Option<String>>,
}

/// Distinguish an absent field from an explicit null.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// PUT /categories/{id}
pub async fn update_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
    Json(request): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let existing = categories::get_category(category_id, &state.db_pool).await?;

    let fields = CategoryFields {
        name: request.name.unwrap_or(existing.name),
        keywords: request.keywords.unwrap_or(existing.keywords),
        exclude_keywords: request.exclude_keywords.unwrap_or(existing.exclude_keywords),
        language: request.language.unwrap_or(existing.language),
        country: request.country.unwrap_or(existing.country),
        is_active: request.is_active.unwrap_or(existing.is_active),
        crawl_period: request.crawl_period.unwrap_or(existing.crawl_period),
    };

    let category =
        categories::update_category(category_id, &fields, &state.config.limits, &state.db_pool)
            .await?;
    Ok(Json(category))
}

/// DELETE /categories/{id} (cascades to jobs and links)
pub async fn delete_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if categories::delete_category(category_id, &state.db_pool).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "category not found: {category_id}"
        )))
    }
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub enabled: bool,
    pub interval_minutes: Option<i32>,
}

/// PATCH /categories/{id}/schedule
pub async fn update_schedule(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<Category>, ApiError> {
    let category = categories::update_schedule(
        category_id,
        request.enabled,
        request.interval_minutes,
        &state.db_pool,
    )
    .await?;
    Ok(Json(category))
}

#[derive(Serialize)]
pub struct ScheduleCapacityResponse {
    pub scheduled_categories: usize,
    pub jobs_per_hour: f64,
    pub capacity_status: &'static str,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Budget the capacity report measures against, in jobs/hour.
const CAPACITY_BUDGET: f64 = 100.0;

/// GET /categories/schedules/capacity
pub async fn schedule_capacity(
    State(state): State<AppState>,
) -> Result<Json<ScheduleCapacityResponse>, ApiError> {
    let scheduled = categories::get_schedule_enabled_categories(&state.db_pool).await?;

    let jobs_per_hour: f64 = scheduled
        .iter()
        .filter_map(|c| c.schedule_interval_minutes)
        .map(|interval| 60.0 / interval as f64)
        .sum();

    let mut warnings = Vec::new();
    let mut recommendations = Vec::new();
    let capacity_status = if jobs_per_hour >= CAPACITY_BUDGET {
        warnings.push(format!(
            "system is at maximum capacity ({jobs_per_hour:.0} jobs/hour)"
        ));
        recommendations.push("disable schedules or widen intervals".to_string());
        "critical"
    } else if jobs_per_hour >= CAPACITY_BUDGET * 0.8 {
        warnings.push(format!(
            "approaching capacity limit ({CAPACITY_BUDGET:.0} jobs/hour)"
        ));
        "warning"
    } else {
        recommendations.push(format!(
            "capacity is healthy ({jobs_per_hour:.0}/{CAPACITY_BUDGET:.0} jobs per hour)"
        ));
        "normal"
    };

    Ok(Json(ScheduleCapacityResponse {
        scheduled_categories: scheduled.len(),
        jobs_per_hour,
        capacity_status,
        warnings,
        recommendations,
    }))
}

//! Category store operations and validation.

use crate::config::LimitsConfig;
use crate::data::models::{ALLOWED_SCHEDULE_INTERVALS, Category};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::PgPool;
use sqlx::types::Json;
use std::sync::LazyLock;
use uuid::Uuid;

static CRAWL_PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+[hdwmy]$").expect("crawl period regex"));

/// Operator-supplied category configuration.
#[derive(Debug, Clone)]
pub struct CategoryFields {
    pub name: String,
    pub keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub language: String,
    pub country: String,
    pub is_active: bool,
    pub crawl_period: Option<String>,
}

/// Validate operator input against the configured limits.
///
/// Returns the trimmed name; keyword lists are validated in place.
pub fn validate_fields(fields: &CategoryFields, limits: &LimitsConfig) -> Result<String> {
    let name = fields.name.trim().to_string();
    if name.is_empty() {
        return Err(CoreError::Validation("category name cannot be empty".into()));
    }
    if name.len() > limits.max_category_name_length {
        return Err(CoreError::Validation(format!(
            "category name cannot exceed {} characters",
            limits.max_category_name_length
        )));
    }

    validate_keyword_list("keywords", &fields.keywords, limits, false)?;
    validate_keyword_list("exclude_keywords", &fields.exclude_keywords, limits, true)?;

    if let Some(period) = &fields.crawl_period
        && !CRAWL_PERIOD_RE.is_match(period)
    {
        return Err(CoreError::Validation(format!(
            "invalid crawl_period '{period}': expected <count><unit> with unit one of h, d, w, m, y"
        )));
    }

    Ok(name)
}

fn validate_keyword_list(
    field: &str,
    keywords: &[String],
    limits: &LimitsConfig,
    allow_empty: bool,
) -> Result<()> {
    if keywords.is_empty() && !allow_empty {
        return Err(CoreError::Validation(format!("{field} cannot be empty")));
    }
    if keywords.len() > limits.max_keywords_per_category {
        return Err(CoreError::Validation(format!(
            "{field} cannot contain more than {} entries",
            limits.max_keywords_per_category
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for keyword in keywords {
        let trimmed = keyword.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation(format!(
                "{field} cannot contain blank entries"
            )));
        }
        if trimmed.len() > limits.max_keyword_length {
            return Err(CoreError::Validation(format!(
                "{field} entries cannot exceed {} characters",
                limits.max_keyword_length
            )));
        }
        if !seen.insert(trimmed.to_lowercase()) {
            return Err(CoreError::Validation(format!(
                "{field} contains duplicate entry '{trimmed}'"
            )));
        }
    }
    Ok(())
}

fn trimmed_list(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|kw| kw.trim().to_string()).collect()
}

/// Whether a database error is a unique violation on the given constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint)
    )
}

/// Insert a new category. Rejects duplicate names with a `duplicate` error.
pub async fn create_category(
    fields: &CategoryFields,
    limits: &LimitsConfig,
    pool: &PgPool,
) -> Result<Category> {
    let name = validate_fields(fields, limits)?;

    let result = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, keywords, exclude_keywords, language, country, is_active, crawl_period)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(Json(trimmed_list(&fields.keywords)))
    .bind(Json(trimmed_list(&fields.exclude_keywords)))
    .bind(&fields.language)
    .bind(&fields.country)
    .bind(fields.is_active)
    .bind(&fields.crawl_period)
    .fetch_one(pool)
    .await;

    match result {
        Ok(category) => Ok(category),
        Err(e) if is_unique_violation(&e, "categories_name_key") => Err(CoreError::Duplicate(
            format!("category '{name}' already exists"),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_category(category_id: Uuid, pool: &PgPool) -> Result<Category> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
        .bind(category_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::not_found("category", category_id))
}

/// List categories, optionally restricted to active ones, newest first.
pub async fn list_categories(active_only: bool, pool: &PgPool) -> Result<Vec<Category>> {
    let rows = if active_only {
        sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE is_active ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY created_at DESC")
            .fetch_all(pool)
            .await?
    };
    Ok(rows)
}

/// Active categories, for the linker and the scanner.
pub async fn get_active_categories(pool: &PgPool) -> Result<Vec<Category>> {
    let rows =
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE is_active ORDER BY name")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

/// Update a category's operator-facing configuration.
///
/// Deactivating a category also disables its schedule, keeping the
/// schedule-requires-active invariant intact.
pub async fn update_category(
    category_id: Uuid,
    fields: &CategoryFields,
    limits: &LimitsConfig,
    pool: &PgPool,
) -> Result<Category> {
    let name = validate_fields(fields, limits)?;

    let result = sqlx::query_as::<_, Category>(
        r#"
        UPDATE categories SET
            name = $2,
            keywords = $3,
            exclude_keywords = $4,
            language = $5,
            country = $6,
            is_active = $7,
            crawl_period = $8,
            schedule_enabled = CASE WHEN $7 THEN schedule_enabled ELSE FALSE END,
            next_scheduled_run_at = CASE WHEN $7 THEN next_scheduled_run_at ELSE NULL END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(category_id)
    .bind(&name)
    .bind(Json(trimmed_list(&fields.keywords)))
    .bind(Json(trimmed_list(&fields.exclude_keywords)))
    .bind(&fields.language)
    .bind(&fields.country)
    .bind(fields.is_active)
    .bind(&fields.crawl_period)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(Some(category)) => Ok(category),
        Ok(None) => Err(CoreError::not_found("category", category_id)),
        Err(e) if is_unique_violation(&e, "categories_name_key") => Err(CoreError::Duplicate(
            format!("category '{name}' already exists"),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Delete a category; jobs and links cascade. Returns whether a row matched.
pub async fn delete_category(category_id: Uuid, pool: &PgPool) -> Result<bool> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Enable or disable the recurring schedule for a category.
///
/// Enabling requires the category to be active and an interval from the
/// allowed set; `next_scheduled_run_at` is primed to `now + interval`.
pub async fn update_schedule(
    category_id: Uuid,
    enabled: bool,
    interval_minutes: Option<i32>,
    pool: &PgPool,
) -> Result<Category> {
    let category = get_category(category_id, pool).await?;

    if enabled {
        let interval = interval_minutes
            .or(category.schedule_interval_minutes)
            .ok_or_else(|| {
                CoreError::Validation("schedule_interval_minutes is required to enable".into())
            })?;
        if !ALLOWED_SCHEDULE_INTERVALS.contains(&interval) {
            return Err(CoreError::Validation(format!(
                "schedule_interval_minutes must be one of {ALLOWED_SCHEDULE_INTERVALS:?}"
            )));
        }
        if !category.is_active {
            return Err(CoreError::StateViolation(
                "cannot enable schedule on an inactive category".into(),
            ));
        }

        let next_run = Utc::now() + chrono::Duration::minutes(interval as i64);
        let updated = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET
                schedule_enabled = TRUE,
                schedule_interval_minutes = $2,
                next_scheduled_run_at = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(category_id)
        .bind(interval)
        .bind(next_run)
        .fetch_one(pool)
        .await?;
        Ok(updated)
    } else {
        let updated = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET
                schedule_enabled = FALSE,
                schedule_interval_minutes = COALESCE($2, schedule_interval_minutes),
                next_scheduled_run_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(category_id)
        .bind(interval_minutes)
        .fetch_one(pool)
        .await?;
        Ok(updated)
    }
}

/// Categories whose schedule is due: active, enabled, and
/// `next_scheduled_run_at <= now`, earliest first.
pub async fn get_due_scheduled_categories(
    now: DateTime<Utc>,
    pool: &PgPool,
) -> Result<Vec<Category>> {
    let rows = sqlx::query_as::<_, Category>(
        "SELECT * FROM categories \
         WHERE is_active AND schedule_enabled \
         AND next_scheduled_run_at IS NOT NULL AND next_scheduled_run_at <= $1 \
         ORDER BY next_scheduled_run_at ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Advance a category's schedule bookkeeping after a scanner tick.
pub async fn update_schedule_timing(
    category_id: Uuid,
    last_run: DateTime<Utc>,
    next_run: DateTime<Utc>,
    pool: &PgPool,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE categories \
         SET last_scheduled_run_at = $2, next_scheduled_run_at = $3, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(category_id)
    .bind(last_run)
    .bind(next_run)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Per-category article count, for `include_stats` listings.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryArticleCount {
    pub category_id: Uuid,
    pub article_count: i64,
}

pub async fn get_article_counts(pool: &PgPool) -> Result<Vec<CategoryArticleCount>> {
    let rows = sqlx::query_as::<_, CategoryArticleCount>(
        "SELECT category_id, COUNT(*)::BIGINT AS article_count \
         FROM article_categories GROUP BY category_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Schedule-enabled categories, for the capacity report.
pub async fn get_schedule_enabled_categories(pool: &PgPool) -> Result<Vec<Category>> {
    let rows = sqlx::query_as::<_, Category>(
        "SELECT * FROM categories WHERE schedule_enabled ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(name: &str, keywords: &[&str]) -> CategoryFields {
        CategoryFields {
            name: name.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            exclude_keywords: Vec::new(),
            language: "en".to_string(),
            country: "US".to_string(),
            is_active: true,
            crawl_period: None,
        }
    }

    #[test]
    fn rejects_empty_name_and_keywords() {
        let limits = LimitsConfig::default();
        assert!(validate_fields(&fields("   ", &["a"]), &limits).is_err());
        assert!(validate_fields(&fields("News", &[]), &limits).is_err());
    }

    #[test]
    fn rejects_duplicate_keywords_case_insensitively() {
        let limits = LimitsConfig::default();
        assert!(validate_fields(&fields("News", &["Python", "python"]), &limits).is_err());
    }

    #[test]
    fn crawl_period_format() {
        let limits = LimitsConfig::default();
        for period in ["1h", "7d", "2w", "6m", "1y", "30d"] {
            let mut f = fields("News", &["tech"]);
            f.crawl_period = Some(period.to_string());
            assert!(validate_fields(&f, &limits).is_ok(), "{period} should be valid");
        }
        for period in ["", "d7", "7", "7days", "-7d", "1.5d"] {
            let mut f = fields("News", &["tech"]);
            f.crawl_period = Some(period.to_string());
            assert!(validate_fields(&f, &limits).is_err(), "{period} should be invalid");
        }
    }

    #[test]
    fn trims_name() {
        let limits = LimitsConfig::default();
        let name = validate_fields(&fields("  World News  ", &["world"]), &limits).unwrap();
        assert_eq!(name, "World News");
    }
}

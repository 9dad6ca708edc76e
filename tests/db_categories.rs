#[allow(dead_code)]
mod helpers;

use chrono::{Duration, Utc};
use newsroom::config::LimitsConfig;
use newsroom::data::categories::{self, CategoryFields};
use newsroom::error::CoreError;
use sqlx::PgPool;

fn fields(name: &str, keywords: &[&str]) -> CategoryFields {
    CategoryFields {
        name: name.to_owned(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        exclude_keywords: Vec::new(),
        language: "en".to_owned(),
        country: "US".to_owned(),
        is_active: true,
        crawl_period: None,
    }
}

// ── create / update ─────────────────────────────────────────────────

#[sqlx::test]
async fn create_returns_full_row(pool: PgPool) {
    let limits = LimitsConfig::default();
    let category = categories::create_category(&fields("Tech", &["python", "ai"]), &limits, &pool)
        .await
        .unwrap();

    assert_eq!(category.name, "Tech");
    assert_eq!(category.keywords, vec!["python", "ai"]);
    assert!(category.is_active);
    assert!(!category.schedule_enabled);
    assert!(category.next_scheduled_run_at.is_none());
}

#[sqlx::test]
async fn duplicate_name_is_rejected(pool: PgPool) {
    let limits = LimitsConfig::default();
    categories::create_category(&fields("Tech", &["python"]), &limits, &pool)
        .await
        .unwrap();

    let err = categories::create_category(&fields("Tech", &["rust"]), &limits, &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Duplicate(_)), "got {err:?}");
}

#[sqlx::test]
async fn deactivating_disables_schedule(pool: PgPool) {
    let limits = LimitsConfig::default();
    let category = categories::create_category(&fields("Tech", &["python"]), &limits, &pool)
        .await
        .unwrap();
    categories::update_schedule(category.id, true, Some(60), &pool)
        .await
        .unwrap();

    let mut updated_fields = fields("Tech", &["python"]);
    updated_fields.is_active = false;
    let updated = categories::update_category(category.id, &updated_fields, &limits, &pool)
        .await
        .unwrap();

    assert!(!updated.is_active);
    assert!(!updated.schedule_enabled);
    assert!(updated.next_scheduled_run_at.is_none());
}

// ── schedule management ─────────────────────────────────────────────

#[sqlx::test]
async fn enabling_schedule_primes_next_run(pool: PgPool) {
    let limits = LimitsConfig::default();
    let category = categories::create_category(&fields("Tech", &["python"]), &limits, &pool)
        .await
        .unwrap();

    let before = Utc::now();
    let updated = categories::update_schedule(category.id, true, Some(60), &pool)
        .await
        .unwrap();

    assert!(updated.schedule_enabled);
    assert_eq!(updated.schedule_interval_minutes, Some(60));
    let next_run = updated.next_scheduled_run_at.expect("next run must be set");
    let expected = before + Duration::minutes(60);
    assert!((next_run - expected).num_seconds().abs() <= 5);
}

#[sqlx::test]
async fn schedule_rejects_unknown_interval(pool: PgPool) {
    let limits = LimitsConfig::default();
    let category = categories::create_category(&fields("Tech", &["python"]), &limits, &pool)
        .await
        .unwrap();

    let err = categories::update_schedule(category.id, true, Some(45), &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)), "got {err:?}");
}

#[sqlx::test]
async fn schedule_requires_active_category(pool: PgPool) {
    let limits = LimitsConfig::default();
    let mut inactive = fields("Dormant", &["python"]);
    inactive.is_active = false;
    let category = categories::create_category(&inactive, &limits, &pool)
        .await
        .unwrap();

    let err = categories::update_schedule(category.id, true, Some(60), &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::StateViolation(_)), "got {err:?}");
}

#[sqlx::test]
async fn due_categories_ordered_by_next_run(pool: PgPool) {
    let now = Utc::now();

    let later = helpers::insert_category(&pool, "Later", &["a"], &[], true).await;
    helpers::enable_schedule(&pool, later, 60, now - Duration::minutes(1)).await;

    let earlier = helpers::insert_category(&pool, "Earlier", &["b"], &[], true).await;
    helpers::enable_schedule(&pool, earlier, 60, now - Duration::minutes(10)).await;

    let not_due = helpers::insert_category(&pool, "NotDue", &["c"], &[], true).await;
    helpers::enable_schedule(&pool, not_due, 60, now + Duration::minutes(10)).await;

    let due = categories::get_due_scheduled_categories(now, &pool)
        .await
        .unwrap();

    let ids: Vec<_> = due.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![earlier, later]);
}

#[sqlx::test]
async fn update_schedule_timing_advances_both_stamps(pool: PgPool) {
    let now = Utc::now();
    let id = helpers::insert_category(&pool, "Tech", &["a"], &[], true).await;
    helpers::enable_schedule(&pool, id, 30, now - Duration::minutes(1)).await;

    let next = now + Duration::minutes(30);
    let matched = categories::update_schedule_timing(id, now, next, &pool)
        .await
        .unwrap();
    assert!(matched);

    // Postgres stores microseconds; compare with a small tolerance.
    let category = categories::get_category(id, &pool).await.unwrap();
    let last = category.last_scheduled_run_at.unwrap();
    let next_stored = category.next_scheduled_run_at.unwrap();
    assert!((last - now).num_milliseconds().abs() < 5);
    assert!((next_stored - next).num_milliseconds().abs() < 5);
}

// ── deletion ────────────────────────────────────────────────────────

#[sqlx::test]
async fn delete_cascades_to_jobs(pool: PgPool) {
    let id = helpers::insert_category(&pool, "Tech", &["a"], &[], true).await;
    helpers::insert_job(
        &pool,
        id,
        newsroom::data::models::JobStatus::Pending,
        0,
        0,
    )
    .await;

    assert!(categories::delete_category(id, &pool).await.unwrap());

    let (jobs,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawl_jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(jobs, 0, "jobs must cascade with their category");
}

//! Scanner tick behavior: due categories become scheduled jobs.

#[allow(dead_code)]
mod helpers;

use chrono::{Duration, Utc};
use newsroom::crawler::scanner::ScheduleScanner;
use newsroom::data::categories;
use newsroom::data::jobs::{self, JobFilter};
use newsroom::data::models::{JobStatus, JobType};
use sqlx::PgPool;

#[sqlx::test]
async fn due_category_gets_exactly_one_scheduled_job(pool: PgPool) {
    let now = Utc::now();
    let category = helpers::insert_category(&pool, "Tech", &["python"], &[], true).await;
    helpers::enable_schedule(&pool, category, 60, now - Duration::minutes(5)).await;

    let tick_start = Utc::now();
    let report = ScheduleScanner::tick(&pool).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.jobs_created, 1);
    assert!(report.failed_category_ids.is_empty());

    let listed = jobs::list_jobs(&JobFilter::default(), &pool).await.unwrap();
    assert_eq!(listed.len(), 1);

    let job = &listed[0];
    assert_eq!(job.category_id, category);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.job_type, JobType::Scheduled);
    assert_eq!(job.priority, 0);
    assert_eq!(
        job.metadata.as_ref().unwrap()["triggered_by"],
        "scanner"
    );

    // Timings advanced: last ≈ tick time, next ≈ tick time + 60m (±5 s)
    let updated = categories::get_category(category, &pool).await.unwrap();
    let last = updated.last_scheduled_run_at.expect("last run set");
    let next = updated.next_scheduled_run_at.expect("next run set");
    assert!((last - tick_start).num_seconds().abs() <= 5);
    assert!((next - (tick_start + Duration::minutes(60))).num_seconds().abs() <= 5);
}

#[sqlx::test]
async fn tick_ignores_not_due_and_disabled(pool: PgPool) {
    let now = Utc::now();

    let not_due = helpers::insert_category(&pool, "NotDue", &["a"], &[], true).await;
    helpers::enable_schedule(&pool, not_due, 60, now + Duration::minutes(30)).await;

    helpers::insert_category(&pool, "NoSchedule", &["b"], &[], true).await;

    let report = ScheduleScanner::tick(&pool).await.unwrap();
    assert_eq!(report.due, 0);
    assert_eq!(report.jobs_created, 0);

    let listed = jobs::list_jobs(&JobFilter::default(), &pool).await.unwrap();
    assert!(listed.is_empty());
}

#[sqlx::test]
async fn category_past_due_does_not_double_fire_within_one_tick(pool: PgPool) {
    let now = Utc::now();
    let category = helpers::insert_category(&pool, "Tech", &["python"], &[], true).await;
    helpers::enable_schedule(&pool, category, 60, now - Duration::hours(3)).await;

    ScheduleScanner::tick(&pool).await.unwrap();
    // Second tick right after: next_scheduled_run_at moved an hour out.
    let report = ScheduleScanner::tick(&pool).await.unwrap();
    assert_eq!(report.due, 0);

    let listed = jobs::list_jobs(&JobFilter::default(), &pool).await.unwrap();
    assert_eq!(listed.len(), 1, "one tick, one job");
}

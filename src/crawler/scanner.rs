//! Schedule scanner: turns "category has an overdue next-run" into jobs.

use crate::config::CrawlerConfig;
use crate::data::jobs::{self, NewJob};
use crate::data::models::JobType;
use crate::data::categories;
use crate::error::Result;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one scanner tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub due: usize,
    pub jobs_created: usize,
    pub failed_category_ids: Vec<Uuid>,
}

/// Periodically scans for due scheduled categories and enqueues jobs.
pub struct ScheduleScanner {
    db_pool: PgPool,
    config: CrawlerConfig,
}

impl ScheduleScanner {
    pub fn new(db_pool: PgPool, config: CrawlerConfig) -> Self {
        Self { db_pool, config }
    }

    /// Runs the scanner's main loop with graceful shutdown support.
    ///
    /// The scanner wakes up on the configured cadence (default 60 seconds),
    /// finds due categories, and enqueues a scheduled job per category. When
    /// a shutdown signal is received, in-progress tick work is cancelled and
    /// given a short grace period to finish.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            queue = crate::crawler::queues::TaskQueue::Maintenance.name(),
            "schedule scanner started"
        );

        let work_interval = self.config.schedule_scan_interval;
        let mut next_run = time::Instant::now();
        let mut current_work: Option<(tokio::task::JoinHandle<()>, CancellationToken)> = None;

        loop {
            tokio::select! {
                _ = time::sleep_until(next_run) => {
                    let cancel_token = CancellationToken::new();

                    let work_handle = tokio::spawn({
                        let db_pool = self.db_pool.clone();
                        let cancel_token = cancel_token.clone();

                        async move {
                            tokio::select! {
                                result = Self::tick(&db_pool) => {
                                    match result {
                                        Ok(report) if report.due > 0 => {
                                            info!(
                                                due = report.due,
                                                jobs_created = report.jobs_created,
                                                failed = report.failed_category_ids.len(),
                                                "schedule tick complete"
                                            );
                                        }
                                        Ok(_) => debug!("schedule tick complete, nothing due"),
                                        Err(e) => error!(error = ?e, "schedule tick failed"),
                                    }
                                }
                                _ = cancel_token.cancelled() => {
                                    debug!("schedule tick cancelled gracefully");
                                }
                            }
                        }
                    });

                    current_work = Some((work_handle, cancel_token));
                    next_run = time::Instant::now() + work_interval;
                }
                _ = shutdown_rx.recv() => {
                    info!("schedule scanner received shutdown signal");

                    if let Some((handle, cancel_token)) = current_work.take() {
                        cancel_token.cancel();

                        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                            warn!("schedule tick did not complete within 5s, abandoning");
                        }
                    }

                    info!("schedule scanner exiting gracefully");
                    break;
                }
            }
        }
    }

    /// One tick: find due categories, enqueue a job each, advance timings.
    ///
    /// Errors are isolated per category: one failure never aborts the tick.
    /// This is a static method (not &self) to allow it to be called from spawned tasks.
    #[tracing::instrument(skip_all)]
    pub async fn tick(db_pool: &PgPool) -> Result<TickReport> {
        let now = Utc::now();
        let due = categories::get_due_scheduled_categories(now, db_pool).await?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for category in due {
            let interval_minutes = match category.schedule_interval_minutes {
                Some(minutes) => minutes,
                None => {
                    // Enabled without an interval should be impossible; skip
                    // rather than loop on it forever.
                    warn!(category_id = %category.id, "schedule enabled without interval");
                    report.failed_category_ids.push(category.id);
                    continue;
                }
            };

            let new_job = NewJob {
                category_id: category.id,
                priority: 0,
                job_type: JobType::Scheduled,
                correlation_id: Some(format!("sched-{}", Uuid::new_v4())),
                metadata: Some(json!({ "triggered_by": "scanner" })),
            };

            match jobs::create_job(&new_job, db_pool).await {
                Ok(job) => {
                    debug!(
                        category = %category.name,
                        job_id = %job.id,
                        "scheduled job enqueued"
                    );
                    report.jobs_created += 1;
                }
                Err(e) => {
                    error!(
                        category_id = %category.id,
                        category = %category.name,
                        error = ?e,
                        "failed to enqueue scheduled job"
                    );
                    report.failed_category_ids.push(category.id);
                    continue;
                }
            }

            let next_run = now + ChronoDuration::minutes(interval_minutes as i64);
            if let Err(e) =
                categories::update_schedule_timing(category.id, now, next_run, db_pool).await
            {
                error!(
                    category_id = %category.id,
                    error = ?e,
                    "failed to advance schedule timing"
                );
                report.failed_category_ids.push(category.id);
            }
        }

        Ok(report)
    }
}

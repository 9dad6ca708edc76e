//! Maintenance loops: old-job cleanup and queue health monitoring.

use crate::config::CrawlerConfig;
use crate::crawler::queues::TaskQueue;
use crate::crawler::retry;
use crate::data::jobs;
use crate::error::Result;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Active jobs beyond this count flag the queue as backlogged.
const BACKLOG_THRESHOLD: i64 = 50;

/// Runs cleanup and health monitoring on their configured cadences, one at a
/// time per task kind.
pub struct MaintenanceRunner {
    db_pool: PgPool,
    config: CrawlerConfig,
}

impl MaintenanceRunner {
    pub fn new(db_pool: PgPool, config: CrawlerConfig) -> Self {
        Self { db_pool, config }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            queue = TaskQueue::Maintenance.name(),
            "maintenance runner started"
        );

        let mut cleanup_timer = time::interval(self.config.cleanup_interval);
        let mut health_timer = time::interval(self.config.health_monitor_interval);
        // The first tick of an interval fires immediately; skip the burst of
        // work at startup for cleanup, keep it for health.
        cleanup_timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        health_timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        cleanup_timer.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("maintenance runner received shutdown signal");
                    break;
                }
                _ = cleanup_timer.tick() => {
                    // Cleanup retries sleep for minutes; keep shutdown
                    // responsive while one is in flight.
                    tokio::select! {
                        _ = self.run_cleanup() => {}
                        _ = shutdown_rx.recv() => {
                            info!("maintenance runner received shutdown signal during cleanup");
                            break;
                        }
                    }
                }
                _ = health_timer.tick() => {
                    if let Err(e) = self.run_health_check().await {
                        // Health gets a single attempt per tick.
                        error!(error = ?e, "health check failed");
                    }
                }
            }
        }
        info!("maintenance runner exiting");
    }

    /// Delete terminal jobs past the retention window, retrying transient
    /// failures up to the cleanup attempt cap.
    ///
    /// The caller races this against the shutdown signal; an abandoned run
    /// leaves nothing to clean up besides the in-flight statement.
    async fn run_cleanup(&self) {
        for attempt in 0..retry::MAX_CLEANUP_ATTEMPTS {
            match jobs::cleanup_old_jobs(self.config.job_cleanup_days, &self.db_pool).await {
                Ok(0) => {
                    debug!("cleanup: nothing to delete");
                    return;
                }
                Ok(deleted) => {
                    info!(deleted, "cleanup: removed old jobs");
                    return;
                }
                Err(e) if attempt + 1 < retry::MAX_CLEANUP_ATTEMPTS => {
                    let delay = Duration::from_secs(120 * (attempt as u64 + 1));
                    warn!(error = ?e, retry_in = ?delay, "cleanup failed, retrying");
                    time::sleep(delay).await;
                }
                Err(e) => {
                    error!(error = ?e, "cleanup failed after retries");
                    return;
                }
            }
        }
    }

    /// Check queue health: reset stuck jobs, inspect backlog, log a summary.
    async fn run_health_check(&self) -> Result<()> {
        let threshold = self.config.stuck_job_threshold_hours;

        let stuck = jobs::find_stuck_jobs(threshold, &self.db_pool).await?;
        if !stuck.is_empty() {
            let ids: Vec<_> = stuck.iter().map(|j| j.id).collect();
            warn!(count = stuck.len(), jobs = ?ids, "stuck jobs detected");
        }

        let reset = jobs::reset_stuck_jobs(threshold, &self.db_pool).await?;
        if reset > 0 {
            // Visible alert: something is holding jobs past the threshold.
            warn!(reset, threshold_hours = threshold, "stuck jobs reset to failed");
        }

        let active = jobs::count_active_jobs(&self.db_pool).await?;
        if active > BACKLOG_THRESHOLD {
            warn!(active, threshold = BACKLOG_THRESHOLD, "job queue backlogged");
        }

        let stats = jobs::get_job_statistics(24, &self.db_pool).await?;
        debug!(
            total = stats.total,
            pending = stats.pending,
            running = stats.running,
            completed = stats.completed,
            failed = stats.failed,
            "queue health summary"
        );

        Ok(())
    }
}

//! Crawl execution subsystem: scanner, worker pool, and maintenance.

pub mod maintenance;
pub mod queues;
pub mod retry;
pub mod scanner;
pub mod worker;

use crate::config::CrawlerConfig;
use crate::data::jobs;
use crate::extract::Extractor;
use crate::services::Service;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use self::maintenance::MaintenanceRunner;
use self::scanner::ScheduleScanner;
use self::worker::Worker;

/// Cancellation handles for currently-running jobs, shared with the web
/// layer so a force-delete can stop the in-flight crawl.
pub type CancellationRegistry = Arc<DashMap<Uuid, CancellationToken>>;

/// The main crawl service managed by the application's `ServiceManager`.
///
/// Holds the shared resources (database pool, extractor) and manages the
/// lifecycle of the scanner, worker, and maintenance tasks.
pub struct CrawlerService {
    db_pool: PgPool,
    extractor: Arc<dyn Extractor>,
    config: CrawlerConfig,
    cancellations: CancellationRegistry,
    scanner_handle: Option<JoinHandle<()>>,
    maintenance_handle: Option<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl CrawlerService {
    pub fn new(
        db_pool: PgPool,
        extractor: Arc<dyn Extractor>,
        config: CrawlerConfig,
        cancellations: CancellationRegistry,
    ) -> Self {
        Self {
            db_pool,
            extractor,
            config,
            cancellations,
            scanner_handle: None,
            maintenance_handle: None,
            worker_handles: Vec::new(),
            shutdown_tx: None,
        }
    }

    /// Starts the scanner, the maintenance runner, and the worker pool.
    ///
    /// Jobs left running by a previous unclean shutdown are reported here;
    /// the stuck-job sweep reclaims them once they pass the threshold.
    pub async fn start(&mut self) {
        match jobs::report_orphaned_jobs(&self.db_pool).await {
            Ok(_) => {}
            Err(e) => warn!(error = ?e, "failed to check for orphaned jobs"),
        }

        info!("crawler service starting");

        let (shutdown_tx, _) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        let scanner = ScheduleScanner::new(self.db_pool.clone(), self.config.clone());
        let shutdown_rx = shutdown_tx.subscribe();
        self.scanner_handle = Some(tokio::spawn(async move {
            scanner.run(shutdown_rx).await;
        }));

        let maintenance = MaintenanceRunner::new(self.db_pool.clone(), self.config.clone());
        let shutdown_rx = shutdown_tx.subscribe();
        self.maintenance_handle = Some(tokio::spawn(async move {
            maintenance.run(shutdown_rx).await;
        }));

        let worker_count = self.config.max_concurrent_jobs.max(1);
        for i in 0..worker_count {
            let worker = Worker::new(
                i,
                self.db_pool.clone(),
                self.extractor.clone(),
                self.config.clone(),
                self.cancellations.clone(),
            );
            let shutdown_rx = shutdown_tx.subscribe();
            self.worker_handles.push(tokio::spawn(async move {
                worker.run(shutdown_rx).await;
            }));
        }
        info!(
            worker_count = self.worker_handles.len(),
            "crawler tasks spawned"
        );
    }
}

#[async_trait::async_trait]
impl Service for CrawlerService {
    fn name(&self) -> &'static str {
        "crawler"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        self.start().await;
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        info!("shutting down crawler service");

        // Cancel in-flight crawls so workers reach their shutdown check fast.
        for entry in self.cancellations.iter() {
            entry.value().cancel();
        }

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        } else {
            warn!("no shutdown channel found for crawler service");
            return Err(anyhow::anyhow!("No shutdown channel available"));
        }

        let mut all_handles = Vec::new();
        if let Some(handle) = self.scanner_handle.take() {
            all_handles.push(handle);
        }
        if let Some(handle) = self.maintenance_handle.take() {
            all_handles.push(handle);
        }
        all_handles.append(&mut self.worker_handles);

        let results = futures::future::join_all(all_handles).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(
                failed_count = failed,
                "some crawler tasks panicked during shutdown"
            );
            return Err(anyhow::anyhow!("{} task(s) panicked", failed));
        }

        info!("all crawler tasks shutdown gracefully");
        Ok(())
    }
}

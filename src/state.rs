//! Application state shared across components (web, crawler).

use crate::config::Config;
use crate::crawler::CancellationRegistry;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    /// Cancellation handles for running jobs, shared with the crawler so the
    /// API can stop an in-flight crawl on force-delete.
    pub cancellations: CancellationRegistry,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: Arc<Config>, cancellations: CancellationRegistry) -> Self {
        Self {
            db_pool,
            config,
            cancellations,
        }
    }
}

use clap::Parser;
use dashmap::DashMap;
use figment::{Figment, providers::Env};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use newsroom::cli::Args;
use newsroom::config::Config;
use newsroom::crawler::CrawlerService;
use newsroom::extract::GoogleNewsExtractor;
use newsroom::logging;
use newsroom::services::manager::ServiceManager;
use newsroom::services::{ServiceResult, web::WebService};
use newsroom::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load configuration first to get log level
    let config: Config = Figment::new()
        .merge(Env::raw())
        .extract()
        .expect("Failed to load config");

    logging::setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting newsroom"
    );

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to create database pool");

    sqlx::migrate!()
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");

    info!(
        port = config.port,
        shutdown_timeout = format!("{:.2?}", config.shutdown_timeout),
        news_base_url = config.news_base_url,
        workers = config.crawler.max_concurrent_jobs,
        "configuration loaded"
    );

    let extractor = Arc::new(
        GoogleNewsExtractor::new(config.news_base_url.clone())
            .expect("Failed to create news extractor"),
    );

    let cancellations = Arc::new(DashMap::new());
    let config = Arc::new(config);
    let app_state = AppState::new(db_pool.clone(), config.clone(), cancellations.clone());

    let shutdown_timeout = config.shutdown_timeout;
    let port = config.port;

    // Create service manager and register services
    let mut service_manager = ServiceManager::new();

    let web_service = Box::new(WebService::new(port, app_state));
    let crawler_service = Box::new(CrawlerService::new(
        db_pool.clone(),
        extractor,
        config.crawler.clone(),
        cancellations,
    ));

    service_manager.register_service("web", web_service);
    service_manager.register_service("crawler", crawler_service);

    service_manager.spawn_all();

    // Set up signal handling for both SIGINT (Ctrl+C) and SIGTERM
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("received ctrl+c, gracefully shutting down...");
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm_stream =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM signal handler");
        sigterm_stream.recv().await;
        info!("received SIGTERM, gracefully shutting down...");
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    let mut exit_code = 0;

    tokio::select! {
        (service_name, result) = service_manager.run() => {
            // A service completed unexpectedly
            match result {
                ServiceResult::GracefulShutdown => {
                    info!(service = service_name, "service completed gracefully");
                }
                ServiceResult::NormalCompletion => {
                    warn!(service = service_name, "service completed unexpectedly");
                    exit_code = 1;
                }
                ServiceResult::Error(e) => {
                    error!(service = service_name, error = ?e, "service failed");
                    exit_code = 1;
                }
            }

            if let Err(pending) = service_manager.shutdown(shutdown_timeout).await {
                warn!(
                    pending_services = ?pending,
                    "graceful shutdown elapsed - {} service(s) did not complete",
                    pending.len()
                );
                exit_code = if exit_code == 0 { 2 } else { exit_code };
            }
        }
        _ = ctrl_c => {
            if let Err(pending) = service_manager.shutdown(shutdown_timeout).await {
                warn!(
                    pending_services = ?pending,
                    "graceful shutdown elapsed - {} service(s) did not complete",
                    pending.len()
                );
                exit_code = 2;
            }
        }
        _ = sigterm => {
            if let Err(pending) = service_manager.shutdown(shutdown_timeout).await {
                warn!(
                    pending_services = ?pending,
                    "graceful shutdown elapsed - {} service(s) did not complete",
                    pending.len()
                );
                exit_code = 2;
            }
        }
    }

    info!(exit_code, "application shutdown complete");
    std::process::exit(exit_code);
}

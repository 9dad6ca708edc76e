//! Router assembly and health probes.

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{Json, Response},
    routing::{get, patch, post, put},
};
use serde_json::{Value, json};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::{
    classify::ServerErrorsFailureClass, compression::CompressionLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{Span, debug, trace, warn};

use crate::state::AppState;

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let category_router = Router::new()
        .route(
            "/categories",
            get(super::categories::list_categories).post(super::categories::create_category),
        )
        .route(
            "/categories/schedules/capacity",
            get(super::categories::schedule_capacity),
        )
        .route(
            "/categories/{id}",
            get(super::categories::get_category)
                .put(super::categories::update_category)
                .delete(super::categories::delete_category),
        )
        .route(
            "/categories/{id}/schedule",
            patch(super::categories::update_schedule),
        );

    let job_router = Router::new()
        .route(
            "/jobs",
            get(super::jobs::list_jobs).post(super::jobs::create_job),
        )
        .route("/jobs/stats", get(super::jobs::job_stats))
        .route("/jobs/{id}/status", get(super::jobs::get_job_status))
        .route("/jobs/{id}/priority", patch(super::jobs::update_priority))
        .route(
            "/jobs/{id}",
            put(super::jobs::update_job).delete(super::jobs::delete_job),
        )
        .route("/jobs/{id}/execute", post(super::jobs::execute_job));

    let article_router = Router::new()
        .route("/articles", get(super::articles::list_articles))
        .route("/articles/stats", get(super::articles::article_stats))
        .route("/articles/export", post(super::articles::export_articles))
        .route("/articles/{id}", get(super::articles::get_article));

    let probe_router = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/live", get(live));

    Router::new()
        .merge(category_router)
        .merge(job_router)
        .merge(article_router)
        .merge(probe_router)
        .with_state(app_state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer((
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    tracing::debug_span!("request", path = request.uri().path())
                })
                .on_request(())
                .on_body_chunk(())
                .on_eos(())
                .on_response(
                    |response: &Response<Body>, latency: Duration, _span: &Span| {
                        let latency_threshold = if cfg!(debug_assertions) {
                            Duration::from_millis(100)
                        } else {
                            Duration::from_millis(1000)
                        };

                        let (latency_str, status) = (
                            format!("{latency:.2?}"),
                            format!(
                                "{} {}",
                                response.status().as_u16(),
                                response.status().canonical_reason().unwrap_or("??")
                            ),
                        );

                        if latency > latency_threshold {
                            warn!(latency = latency_str, status = status, "Response");
                        } else {
                            debug!(latency = latency_str, status = status, "Response");
                        }
                    },
                )
                .on_failure(
                    |error: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                        warn!(
                            error = ?error,
                            latency = format!("{latency:.2?}"),
                            "Request failed"
                        );
                    },
                ),
            TimeoutLayer::new(Duration::from_secs(30)),
        ))
}

/// Health check endpoint
async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("GIT_COMMIT_SHORT"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Readiness probe: the service is ready when the database answers.
async fn ready(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db_pool)
        .await
    {
        Ok(_) => Ok(Json(json!({ "status": "ready" }))),
        Err(e) => {
            warn!(error = %e, "readiness probe failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready", "reason": "database unreachable" })),
            ))
        }
    }
}

/// Liveness probe: answers as long as the process is serving requests.
async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

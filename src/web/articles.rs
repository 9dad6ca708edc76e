//! Article endpoints: listing, detail, stats, export.

use crate::data::articles::{self, ArticleFilter};
use crate::data::models::Article;
use crate::data::categories;
use crate::state::AppState;
use crate::web::error::ApiError;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::Query;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Row cap for exports; large archives go out in windowed requests.
const EXPORT_LIMIT: i64 = 10_000;

#[derive(Deserialize)]
pub struct ListArticlesParams {
    pub category_id: Option<Uuid>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    /// Case-insensitive title substring search
    pub q: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
pub struct ArticleListResponse {
    pub articles: Vec<Article>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl ListArticlesParams {
    fn to_filter(&self) -> ArticleFilter {
        ArticleFilter {
            category_id: self.category_id,
            published_after: self.published_after,
            published_before: self.published_before,
            title_query: self.q.clone(),
            limit: self.limit.clamp(1, 500),
            offset: self.offset.max(0),
        }
    }
}

/// GET /articles
pub async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<ListArticlesParams>,
) -> Result<Json<ArticleListResponse>, ApiError> {
    let filter = params.to_filter();
    let (articles, total) = articles::list_articles(&filter, &state.db_pool).await?;
    Ok(Json(ArticleListResponse {
        articles,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

#[derive(Serialize)]
pub struct ArticleDetailResponse {
    #[serde(flatten)]
    pub article: Article,
    pub categories: Vec<articles::ArticleCategoryRef>,
}

/// GET /articles/{id}
pub async fn get_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<ArticleDetailResponse>, ApiError> {
    let article = articles::get_article(article_id, &state.db_pool).await?;
    let categories = articles::get_article_categories(article_id, &state.db_pool).await?;
    Ok(Json(ArticleDetailResponse {
        article,
        categories,
    }))
}

/// GET /articles/stats
pub async fn article_stats(
    State(state): State<AppState>,
) -> Result<Json<articles::ArticleStats>, ApiError> {
    let stats = articles::get_article_stats(&state.db_pool).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Xlsx,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub category_id: Option<Uuid>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
}

/// POST /articles/export
pub async fn export_articles(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    // A category filter referencing a missing category is a 404, not an
    // empty export.
    if let Some(category_id) = request.category_id {
        categories::get_category(category_id, &state.db_pool).await?;
    }

    let filter = ArticleFilter {
        category_id: request.category_id,
        published_after: request.published_after,
        published_before: request.published_before,
        title_query: None,
        limit: EXPORT_LIMIT,
        offset: 0,
    };
    let (articles, _total) = articles::list_articles(&filter, &state.db_pool).await?;

    match request.format {
        ExportFormat::Json => {
            let body = serde_json::to_vec(&articles)
                .map_err(|e| ApiError::internal_error(format!("serialization failed: {e}")))?;
            Ok(export_response(body, "application/json", "articles.json"))
        }
        ExportFormat::Csv => {
            let body = to_csv(&articles)
                .map_err(|e| ApiError::internal_error(format!("csv encoding failed: {e}")))?;
            Ok(export_response(body, "text/csv", "articles.csv"))
        }
        ExportFormat::Xlsx => {
            warn!(format = ?request.format, "xlsx export rejected");
            Err(ApiError::unprocessable(
                "xlsx export is not supported; use json or csv",
            ))
        }
    }
}

fn export_response(body: Vec<u8>, content_type: &str, filename: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn to_csv(articles: &[Article]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "title",
        "author",
        "source_url",
        "publish_date",
        "relevance_score",
        "keywords_matched",
        "last_seen",
    ])?;

    for article in articles {
        writer.write_record([
            article.id.to_string(),
            article.title.clone(),
            article.author.clone().unwrap_or_default(),
            article.source_url.clone(),
            article
                .publish_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            article.relevance_score.to_string(),
            article
                .keywords_matched
                .as_ref()
                .map(|kws| kws.join("|"))
                .unwrap_or_default(),
            article.last_seen.to_rfc3339(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(std::io::Error::other(e.to_string())))
}

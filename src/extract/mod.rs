//! Adapter boundary around the external news search + extraction capability.
//!
//! The core only sees [`Extractor`]: a query goes in, candidate records come
//! out, and each candidate can be expanded into full content. How the
//! implementation resolves redirects or renders pages is opaque here.

pub mod google_news;

use crate::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use google_news::GoogleNewsExtractor;

/// A search request against the news provider.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub language: String,
    pub country: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_results: u32,
}

/// A search result before extraction: the minimum is a title and a URL.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub title: String,
    pub source_url: String,
    pub publish_date: Option<DateTime<Utc>>,
    pub snippet: Option<String>,
}

/// Per-candidate extraction output. Every field may be absent.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub content: Option<String>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("news provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("news provider unavailable: {0}")]
    Unavailable(String),
    #[error("extraction failed: {0}")]
    Failed(String),
}

impl From<ExtractError> for CoreError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::RateLimited { retry_after } => CoreError::RateLimited { retry_after },
            ExtractError::Unavailable(msg) => CoreError::ExternalService(msg),
            ExtractError::Failed(msg) => CoreError::ExternalService(msg),
        }
    }
}

/// The external search + extract capability.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Discover candidate articles for a query.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, ExtractError>;

    /// Expand a candidate into full content. Failures here drop the candidate
    /// only; the crawl continues.
    async fn extract(&self, candidate: &Candidate) -> Result<ExtractedContent, ExtractError>;
}

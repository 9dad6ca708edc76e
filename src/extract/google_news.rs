//! Google News RSS implementation of the [`Extractor`] trait.
//!
//! Search goes through the RSS endpoint
//! (`/search?q=...&hl=...&gl=...&ceid=...`); extraction fetches the article
//! page (following redirects) and pulls OpenGraph metadata plus paragraph
//! text. Redirect resolution beyond plain HTTP is the provider's problem,
//! not ours.

use super::{Candidate, ExtractError, ExtractedContent, Extractor, SearchRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, trace};

/// Request timeout for both feed and article fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Paragraphs shorter than this are navigation/boilerplate, not body text.
const MIN_PARAGRAPH_CHARS: usize = 40;

static META_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta[^>]+(?:property|name)\s*=\s*["']([^"']+)["'][^>]+content\s*=\s*["']([^"']*)["']"#)
        .expect("meta tag regex")
});

static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<p[^>]*>(.*?)</p>").expect("paragraph regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

pub struct GoogleNewsExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleNewsExtractor {
    pub fn new(base_url: String) -> Result<Self, ExtractError> {
        url::Url::parse(&base_url)
            .map_err(|e| ExtractError::Unavailable(format!("invalid base url '{base_url}': {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("newsroom/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExtractError::Unavailable(format!("failed to build client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Assemble the RSS search URL, folding the date window into the query
    /// with `after:` / `before:` operators.
    fn search_url(&self, request: &SearchRequest) -> String {
        let mut query = request.query.clone();
        if let Some(start) = request.start_date {
            query.push_str(&format!(" after:{}", start.format("%Y-%m-%d")));
        }
        if let Some(end) = request.end_date {
            query.push_str(&format!(" before:{}", end.format("%Y-%m-%d")));
        }

        format!(
            "{}/search?q={}&hl={}&gl={}&ceid={}:{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&query),
            request.language,
            request.country,
            request.country,
            request.language,
        )
    }

    fn rate_limit_error(response: &reqwest::Response) -> ExtractError {
        let retry_after = response
            .headers()
            .get(http::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        ExtractError::RateLimited { retry_after }
    }
}

#[async_trait]
impl Extractor for GoogleNewsExtractor {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, ExtractError> {
        let url = self.search_url(request);
        debug!(url = %url, "fetching news feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExtractError::Unavailable(format!("feed request failed: {e}")))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(Self::rate_limit_error(&response));
        }
        if !response.status().is_success() {
            return Err(ExtractError::Unavailable(format!(
                "feed returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExtractError::Unavailable(format!("feed body read failed: {e}")))?;

        let mut candidates = parse_feed(&body)?;
        candidates.truncate(request.max_results as usize);
        debug!(count = candidates.len(), "feed parsed");
        Ok(candidates)
    }

    async fn extract(&self, candidate: &Candidate) -> Result<ExtractedContent, ExtractError> {
        trace!(url = %candidate.source_url, "extracting article");

        let response = self
            .client
            .get(&candidate.source_url)
            .send()
            .await
            .map_err(|e| ExtractError::Failed(format!("article fetch failed: {e}")))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(Self::rate_limit_error(&response));
        }
        if !response.status().is_success() {
            return Err(ExtractError::Failed(format!(
                "article returned {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ExtractError::Failed(format!("article body read failed: {e}")))?;

        Ok(extract_from_html(&html))
    }
}

/// Parse the RSS feed into candidates. Items without both a title and a link
/// are dropped.
fn parse_feed(xml: &str) -> Result<Vec<Candidate>, ExtractError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| ExtractError::Unavailable(format!("feed parse failed: {e}")))?;

    let mut candidates = Vec::new();
    for item in doc.descendants().filter(|n| n.has_tag_name("item")) {
        let text_of = |tag: &str| -> Option<String> {
            item.children()
                .find(|n| n.has_tag_name(tag))
                .and_then(|n| n.text())
                .map(|t| html_escape::decode_html_entities(t.trim()).into_owned())
                .filter(|t| !t.is_empty())
        };

        let Some(title) = text_of("title") else {
            continue;
        };
        let Some(source_url) = text_of("link") else {
            continue;
        };

        let publish_date = text_of("pubDate")
            .and_then(|d| DateTime::parse_from_rfc2822(&d).ok())
            .map(|d| d.with_timezone(&Utc));

        // Descriptions carry an HTML snippet; reduce to text.
        let snippet = text_of("description")
            .map(|d| TAG_RE.replace_all(&d, " ").to_string())
            .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|d| !d.is_empty());

        candidates.push(Candidate {
            title,
            source_url,
            publish_date,
            snippet,
        });
    }

    Ok(candidates)
}

/// Pull OpenGraph metadata and paragraph text out of an article page.
fn extract_from_html(html: &str) -> ExtractedContent {
    let mut extracted = ExtractedContent::default();

    for captures in META_TAG_RE.captures_iter(html) {
        let key = captures[1].to_lowercase();
        let value = html_escape::decode_html_entities(&captures[2]).into_owned();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "og:image" if extracted.image_url.is_none() => extracted.image_url = Some(value),
            "author" | "article:author" if extracted.author.is_none() => {
                extracted.author = Some(value)
            }
            "article:published_time" if extracted.publish_date.is_none() => {
                extracted.publish_date = DateTime::parse_from_rfc3339(&value)
                    .ok()
                    .map(|d| d.with_timezone(&Utc));
            }
            _ => {}
        }
    }

    let paragraphs: Vec<String> = PARAGRAPH_RE
        .captures_iter(html)
        .map(|c| {
            let text = TAG_RE.replace_all(&c[1], " ");
            let decoded = html_escape::decode_html_entities(text.as_ref()).into_owned();
            decoded.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|p| p.len() >= MIN_PARAGRAPH_CHARS)
        .collect();

    if !paragraphs.is_empty() {
        extracted.content = Some(paragraphs.join("\n\n"));
    }

    extracted
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel>
            <title>query - Google News</title>
            <item>
                <title>Python AI breakthrough</title>
                <link>https://example.com/python-ai</link>
                <pubDate>Mon, 20 Jan 2025 10:00:00 GMT</pubDate>
                <description>&lt;a href="x"&gt;Researchers built a framework&lt;/a&gt;</description>
            </item>
            <item>
                <title>No link here</title>
            </item>
        </channel></rss>"#;

    #[test]
    fn parses_items_and_drops_linkless() {
        let candidates = parse_feed(FEED).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Python AI breakthrough");
        assert_eq!(candidates[0].source_url, "https://example.com/python-ai");
        assert!(candidates[0].publish_date.is_some());
        assert_eq!(
            candidates[0].snippet.as_deref(),
            Some("Researchers built a framework")
        );
    }

    #[test]
    fn extracts_meta_and_paragraphs() {
        let html = r#"<html><head>
            <meta property="og:image" content="https://example.com/img.jpg">
            <meta name="author" content="Jane Reporter">
            <meta property="article:published_time" content="2025-01-20T10:00:00Z">
        </head><body>
            <p>Short.</p>
            <p>This paragraph is long enough to count as actual article body text for extraction.</p>
        </body></html>"#;

        let extracted = extract_from_html(html);
        assert_eq!(
            extracted.image_url.as_deref(),
            Some("https://example.com/img.jpg")
        );
        assert_eq!(extracted.author.as_deref(), Some("Jane Reporter"));
        assert!(extracted.publish_date.is_some());
        let content = extracted.content.unwrap();
        assert!(content.contains("long enough"));
        assert!(!content.contains("Short."));
    }

    #[test]
    fn search_url_includes_window_operators() {
        let extractor = GoogleNewsExtractor::new("https://news.google.com/rss".into()).unwrap();
        let request = SearchRequest {
            query: "\"python\"".into(),
            language: "en".into(),
            country: "US".into(),
            start_date: Some("2025-01-01T00:00:00Z".parse().unwrap()),
            end_date: Some("2025-01-31T00:00:00Z".parse().unwrap()),
            max_results: 100,
        };
        let url = extractor.search_url(&request);
        assert!(url.contains("after%3A2025-01-01"));
        assert!(url.contains("before%3A2025-01-31"));
        assert!(url.contains("hl=en"));
        assert!(url.contains("ceid=US:en"));
    }
}

//! Multi-category article linking.
//!
//! An article may belong to every category whose keywords it matches; each
//! link carries its own relevance. Exclusion keywords veto a category
//! regardless of how well its keywords match.

use crate::data::models::Category;
use crate::matching::keywords;
use uuid::Uuid;

/// Default minimum relevance for a link to be created.
pub const DEFAULT_MIN_RELEVANCE: f64 = 0.3;

/// A category the article should be linked to, with per-association relevance.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMatch {
    pub category_id: Uuid,
    pub relevance_score: f64,
}

/// Find all categories matching the article's text.
///
/// Inactive categories are skipped. A category whose exclude keyword appears
/// anywhere in `title + content` is skipped outright. Results are sorted by
/// relevance descending, ties broken by category name ascending.
pub fn find_matches(
    title: &str,
    content: Option<&str>,
    categories: &[Category],
    min_relevance: f64,
) -> Vec<CategoryMatch> {
    let combined = format!("{} {}", title, content.unwrap_or("")).to_lowercase();
    if combined.trim().is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<(&Category, f64)> = Vec::new();

    for category in categories {
        if !category.is_active {
            continue;
        }

        let excluded = category
            .exclude_keywords
            .iter()
            .any(|kw| !kw.trim().is_empty() && combined.contains(&kw.trim().to_lowercase()));
        if excluded {
            continue;
        }

        let matched = keywords::match_keywords(title, content, &category.keywords);
        if matched.is_empty() {
            continue;
        }

        let relevance = keywords::relevance(title, content, &matched);
        if relevance >= min_relevance {
            matches.push((category, relevance));
        }
    }

    matches.sort_by(|(a, ra), (b, rb)| {
        rb.partial_cmp(ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    matches
        .into_iter()
        .map(|(category, relevance_score)| CategoryMatch {
            category_id: category.id,
            relevance_score,
        })
        .collect()
}

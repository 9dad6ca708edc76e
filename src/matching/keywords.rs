//! Search query construction and keyword matching.
//!
//! Queries are built provider-side (`"kw1" OR "kw2" -"ex1"`); matching is a
//! case-insensitive substring test over `title + " " + content`.

use crate::error::{CoreError, Result};
use indexmap::IndexSet;

/// Normalize keywords for query assembly.
///
/// Strips surrounding whitespace, removes characters outside
/// `[A-Za-z0-9 ._-]`, collapses internal whitespace, and drops
/// case-insensitive duplicates while preserving first occurrence.
pub fn sanitize_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut cleaned = Vec::new();

    for keyword in keywords {
        let stripped: String = keyword
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
            .collect();
        let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.to_lowercase()) {
            cleaned.push(normalized);
        }
    }

    cleaned
}

/// Build an OR query from keywords: `"kw1" OR "kw2" OR ...`.
///
/// Errors if no usable keyword survives sanitisation.
pub fn build_query(keywords: &[String]) -> Result<String> {
    let cleaned = sanitize_keywords(keywords);
    if cleaned.is_empty() {
        return Err(CoreError::Validation(
            "cannot build search query from empty keyword list".into(),
        ));
    }

    Ok(cleaned
        .iter()
        .map(|kw| format!("\"{kw}\""))
        .collect::<Vec<_>>()
        .join(" OR "))
}

/// Build a query with exclusions: `("kw1" OR "kw2") -"ex1" -"ex2"`.
///
/// A single keyword collapses the parentheses: `"kw1" -"ex1"`.
pub fn build_query_with_exclusions(
    keywords: &[String],
    exclude_keywords: &[String],
) -> Result<String> {
    let cleaned = sanitize_keywords(keywords);
    if cleaned.is_empty() {
        return Err(CoreError::Validation(
            "cannot build search query from empty keyword list".into(),
        ));
    }

    let base = if cleaned.len() == 1 {
        format!("\"{}\"", cleaned[0])
    } else {
        let quoted: Vec<String> = cleaned.iter().map(|kw| format!("\"{kw}\"")).collect();
        format!("({})", quoted.join(" OR "))
    };

    let exclusions = sanitize_keywords(exclude_keywords);
    if exclusions.is_empty() {
        return Ok(base);
    }

    let exclude_part = exclusions
        .iter()
        .map(|kw| format!("-\"{kw}\""))
        .collect::<Vec<_>>()
        .join(" ");

    Ok(format!("{base} {exclude_part}"))
}

/// Keywords that actually appear in the article's title or content.
///
/// Case-insensitive substring test against `title + " " + content`. Input
/// order is preserved; duplicates are dropped.
pub fn match_keywords(title: &str, content: Option<&str>, keywords: &[String]) -> Vec<String> {
    let combined = format!("{} {}", title, content.unwrap_or("")).to_lowercase();
    if combined.trim().is_empty() {
        return Vec::new();
    }

    let mut seen: IndexSet<&str> = IndexSet::new();
    keywords
        .iter()
        .filter(|kw| {
            let trimmed = kw.trim();
            !trimmed.is_empty() && combined.contains(&trimmed.to_lowercase())
        })
        .filter(|kw| seen.insert(kw.as_str()))
        .cloned()
        .collect()
}

/// Binary 50/50 relevance: 0.5 if any matched keyword appears in the title,
/// 0.5 if any appears in the content. Result is one of {0.0, 0.5, 1.0}.
pub fn relevance(title: &str, content: Option<&str>, matched_keywords: &[String]) -> f64 {
    if matched_keywords.is_empty() {
        return 0.0;
    }

    let title_lower = title.to_lowercase();
    let content_lower = content.unwrap_or("").to_lowercase();

    let in_title = matched_keywords
        .iter()
        .any(|kw| title_lower.contains(&kw.trim().to_lowercase()));
    let in_content = matched_keywords
        .iter()
        .any(|kw| content_lower.contains(&kw.trim().to_lowercase()));

    let title_score = if in_title { 0.5 } else { 0.0 };
    let content_score = if in_content { 0.5 } else { 0.0 };
    title_score + content_score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn build_query_quotes_and_joins() {
        let query = build_query(&kws(&["python", "machine learning"])).unwrap();
        assert_eq!(query, "\"python\" OR \"machine learning\"");
    }

    #[test]
    fn build_query_rejects_empty() {
        assert!(build_query(&[]).is_err());
        assert!(build_query(&kws(&["   ", "!!!"])).is_err());
    }

    #[test]
    fn exclusions_collapse_parens_for_single_keyword() {
        let query = build_query_with_exclusions(&kws(&["python"]), &kws(&["java"])).unwrap();
        assert_eq!(query, "\"python\" -\"java\"");

        let query = build_query_with_exclusions(&kws(&["python", "ai"]), &kws(&["java"])).unwrap();
        assert_eq!(query, "(\"python\" OR \"ai\") -\"java\"");
    }

    #[test]
    fn sanitize_strips_and_dedupes_case_insensitively() {
        let cleaned = sanitize_keywords(&kws(&["  Python  ", "python", "C++", "a  b"]));
        assert_eq!(cleaned, vec!["Python", "C", "a b"]);
    }

    #[test]
    fn match_is_case_insensitive_and_ordered() {
        let matched = match_keywords(
            "Python AI breakthrough",
            Some("Researchers built a framework."),
            &kws(&["ai", "python", "rust"]),
        );
        assert_eq!(matched, vec!["ai", "python"]);
    }

    #[test]
    fn match_with_no_keywords_is_empty() {
        assert!(match_keywords("Title", Some("content"), &[]).is_empty());
    }

    #[test]
    fn relevance_is_binary_fifty_fifty() {
        // Title and content both match
        let matched = kws(&["python"]);
        assert_eq!(
            relevance("Python rocks", Some("More python here"), &matched),
            1.0
        );
        // Content only
        assert_eq!(
            relevance("Fintech update", Some("New blockchain protocol released."), &kws(&["blockchain"])),
            0.5
        );
        // Title only
        assert_eq!(relevance("Python rocks", Some("nothing else"), &matched), 0.5);
        // No matches at all
        assert_eq!(relevance("Title", Some("content"), &[]), 0.0);
    }
}

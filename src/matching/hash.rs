//! Identity hashes for article deduplication.
//!
//! URL-hash equality is identity: two sightings with the same `url_hash` are
//! the same article. Content-hash equality across different URLs is reported
//! for observability but never merges rows.

use sha2::{Digest, Sha256};

/// SHA-256 of the source URL, hex-encoded.
///
/// The input is taken verbatim after trimming; case and internal whitespace
/// are significant.
pub fn url_hash(source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_url.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of the article content, hex-encoded.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

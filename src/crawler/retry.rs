//! Retry discipline: exponential backoff keyed by error kind.

use crate::error::ErrorKind;
use rand::Rng;
use std::time::Duration;

/// Maximum execution attempts for a crawl job (1 initial + 2 retries).
pub const MAX_CRAWL_ATTEMPTS: u32 = 3;

/// Maximum execution attempts for the cleanup task.
pub const MAX_CLEANUP_ATTEMPTS: u32 = 2;

/// Backoff before retry attempt `retry_index` (0-based) for the given error
/// kind, or `None` when the kind is not retryable.
///
/// A provider-supplied `hint` (e.g. Retry-After) overrides the schedule for
/// rate limits.
pub fn backoff(kind: ErrorKind, retry_index: u32, hint: Option<Duration>) -> Option<Duration> {
    if !kind.is_retryable() {
        return None;
    }

    let k = retry_index.min(16);
    let secs = match kind {
        ErrorKind::RateLimit => match hint {
            Some(hint) => return Some(hint),
            None => 900 + 300 * k as u64,
        },
        ErrorKind::ExternalService => (60u64 << k).min(300),
        ErrorKind::Database => (30u64 << k).min(120),
        ErrorKind::Application => (60u64 << k).min(180),
        ErrorKind::Unexpected => (120u64 << k).min(600),
        _ => unreachable!("retryable kinds are covered above"),
    };

    Some(Duration::from_secs(secs))
}

/// Add up to 10% random jitter so synchronized failures do not retry in
/// lockstep.
pub fn with_jitter(delay: Duration) -> Duration {
    let jitter_cap = delay.as_millis() as u64 / 10;
    if jitter_cap == 0 {
        return delay;
    }
    let jitter = rand::rng().random_range(0..=jitter_cap);
    delay + Duration::from_millis(jitter)
}

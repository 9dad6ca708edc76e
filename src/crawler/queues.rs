//! Task queue routing and per-queue rate limits.
//!
//! Task kinds map onto three named queues; each queue carries its own rate
//! quota, enforced per worker with a `governor` limiter.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

/// The named queues task kinds are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskQueue {
    /// Ad-hoc coordination work (job triggering, schedule bookkeeping).
    Default,
    /// Category crawl execution.
    Crawl,
    /// Cleanup, health monitoring, stuck-job sweeps.
    Maintenance,
}

impl TaskQueue {
    pub fn name(self) -> &'static str {
        match self {
            TaskQueue::Default => "default",
            TaskQueue::Crawl => "crawl_queue",
            TaskQueue::Maintenance => "maintenance_queue",
        }
    }

    /// Per-worker rate quota for this queue.
    pub fn quota(self, crawl_per_minute: u32) -> Quota {
        let nz = |n: u32| NonZeroU32::new(n.max(1)).expect("nonzero quota");
        match self {
            TaskQueue::Default => Quota::per_minute(nz(100)),
            TaskQueue::Crawl => Quota::per_minute(nz(crawl_per_minute)),
            TaskQueue::Maintenance => Quota::per_hour(nz(1)),
        }
    }

    pub fn limiter(self, crawl_per_minute: u32) -> DefaultDirectRateLimiter {
        RateLimiter::direct(self.quota(crawl_per_minute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_are_stable() {
        assert_eq!(TaskQueue::Default.name(), "default");
        assert_eq!(TaskQueue::Crawl.name(), "crawl_queue");
        assert_eq!(TaskQueue::Maintenance.name(), "maintenance_queue");
    }

    #[test]
    fn crawl_quota_tracks_config() {
        let limiter = TaskQueue::Crawl.limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err(), "third immediate start should be limited");
    }
}

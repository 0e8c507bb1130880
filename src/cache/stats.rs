//! Orchestrator statistics.

use crate::remote::RemoteStats;
use crate::storage::LocalStats;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which tiers are serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheMode {
    #[serde(rename = "remote+local")]
    RemoteAndLocal,
    #[serde(rename = "local-only")]
    LocalOnly,
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::RemoteAndLocal => write!(f, "remote+local"),
            CacheMode::LocalOnly => write!(f, "local-only"),
        }
    }
}

/// Request counters across both tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub local_hits: u64,
    pub local_misses: u64,
    pub remote_hits: u64,
    pub remote_misses: u64,
    pub remote_errors: u64,
    pub total_requests: u64,
}

/// Everything [`TieredCache::stats`](crate::cache::TieredCache::stats) reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub mode: CacheMode,
    pub global: GlobalStats,
    pub local: LocalStats,
    /// `None` when no remote tier is active
    pub remote: Option<RemoteStats>,
}

#[derive(Debug, Default)]
pub(crate) struct GlobalCounters {
    pub local_hits: AtomicU64,
    pub local_misses: AtomicU64,
    pub remote_hits: AtomicU64,
    pub remote_misses: AtomicU64,
    pub remote_errors: AtomicU64,
    pub total_requests: AtomicU64,
}

impl GlobalCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GlobalStats {
        GlobalStats {
            local_hits: self.local_hits.load(Ordering::Relaxed),
            local_misses: self.local_misses.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            remote_misses: self.remote_misses.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// METRICS COLLECTOR - counting races, winners, and the ones that fell over
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters only. The orchestrator and the session controller bump
// these; the binary logs a snapshot when it exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::adapters::Tier;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub lookups: u64,
    pub cache_hits: u64,
    pub adapter_invocations: u64,
    pub adapter_errors: u64,
    pub adapter_no_results: u64,
    pub primary_wins: u64,
    pub deferred_wins: u64,
    pub lookups_exhausted: u64,
    pub retries: u64,
    pub values_failed: u64,
    pub uptime_seconds: u64,
}

pub struct MetricsCollector {
    lookups: AtomicU64,
    cache_hits: AtomicU64,
    adapter_invocations: AtomicU64,
    adapter_errors: AtomicU64,
    adapter_no_results: AtomicU64,
    primary_wins: AtomicU64,
    deferred_wins: AtomicU64,
    lookups_exhausted: AtomicU64,
    retries: AtomicU64,
    values_failed: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            lookups: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            adapter_invocations: AtomicU64::new(0),
            adapter_errors: AtomicU64::new(0),
            adapter_no_results: AtomicU64::new(0),
            primary_wins: AtomicU64::new(0),
            deferred_wins: AtomicU64::new(0),
            lookups_exhausted: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            values_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invocation(&self) {
        self.adapter_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_adapter_error(&self) {
        self.adapter_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_result(&self) {
        self.adapter_no_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_win(&self, tier: Tier) {
        match tier {
            Tier::Primary => self.primary_wins.fetch_add(1, Ordering::Relaxed),
            Tier::Deferred => self.deferred_wins.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_exhausted(&self) {
        self.lookups_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_value_failed(&self) {
        self.values_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            adapter_invocations: self.adapter_invocations.load(Ordering::Relaxed),
            adapter_errors: self.adapter_errors.load(Ordering::Relaxed),
            adapter_no_results: self.adapter_no_results.load(Ordering::Relaxed),
            primary_wins: self.primary_wins.load(Ordering::Relaxed),
            deferred_wins: self.deferred_wins.load(Ordering::Relaxed),
            lookups_exhausted: self.lookups_exhausted.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            values_failed: self.values_failed.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wins_are_split_by_tier() {
        let metrics = MetricsCollector::new();
        metrics.record_win(Tier::Primary);
        metrics.record_win(Tier::Primary);
        metrics.record_win(Tier::Deferred);
        let snap = metrics.snapshot();
        assert_eq!(snap.primary_wins, 2);
        assert_eq!(snap.deferred_wins, 1);
        assert_eq!(snap.lookups, 0);
    }
}

//! Per-loop atomic counters.
//!
//! Counters are bumped silently at the call site. Call [`LoopMetrics::flush`]
//! at a natural boundary to emit every value as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters owned by one `AutonomyLoop`.
#[derive(Debug, Default)]
pub struct LoopMetrics {
    operations: AtomicU64,
    adapter_calls: AtomicU64,
    retries: AtomicU64,
    cache_hits: AtomicU64,
    cost_rejections: AtomicU64,
    policy_rejections: AtomicU64,
}

/// Point-in-time copy of [`LoopMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub operations: u64,
    pub adapter_calls: u64,
    pub retries: u64,
    pub cache_hits: u64,
    pub cost_rejections: u64,
    pub policy_rejections: u64,
}

impl LoopMetrics {
    pub const fn new() -> Self {
        Self {
            operations: AtomicU64::new(0),
            adapter_calls: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cost_rejections: AtomicU64::new(0),
            policy_rejections: AtomicU64::new(0),
        }
    }

    pub fn inc_operations(&self) {
        bump(&self.operations, "operations");
    }

    pub fn inc_adapter_calls(&self) {
        bump(&self.adapter_calls, "adapter_calls");
    }

    pub fn inc_retries(&self) {
        bump(&self.retries, "retries");
    }

    pub fn inc_cache_hits(&self) {
        bump(&self.cache_hits, "cache_hits");
    }

    pub fn inc_cost_rejections(&self) {
        bump(&self.cost_rejections, "cost_rejections");
    }

    /// Counts every decision-phase stop: no agent, policy, approval.
    pub fn inc_policy_rejections(&self) {
        bump(&self.policy_rejections, "policy_rejections");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations: self.operations.load(Ordering::Relaxed),
            adapter_calls: self.adapter_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cost_rejections: self.cost_rejections.load(Ordering::Relaxed),
            policy_rejections: self.policy_rejections.load(Ordering::Relaxed),
        }
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            operations = s.operations,
            adapter_calls = s.adapter_calls,
            retries = s.retries,
            cache_hits = s.cache_hits,
            cost_rejections = s.cost_rejections,
            policy_rejections = s.policy_rejections,
        );
    }

    pub fn reset(&self) {
        for counter in [
            &self.operations,
            &self.adapter_calls,
            &self.retries,
            &self.cache_hits,
            &self.cost_rejections,
            &self.policy_rejections,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn bump(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric = name, "counter incremented");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = LoopMetrics::new();
        m.inc_operations();
        m.inc_operations();
        m.inc_adapter_calls();
        m.inc_retries();
        m.inc_cache_hits();
        let s = m.snapshot();
        assert_eq!(s.operations, 2);
        assert_eq!(s.adapter_calls, 1);
        assert_eq!(s.retries, 1);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.cost_rejections, 0);
    }

    #[test]
    fn instances_are_independent() {
        let a = LoopMetrics::new();
        let b = LoopMetrics::new();
        a.inc_cost_rejections();
        assert_eq!(a.snapshot().cost_rejections, 1);
        assert_eq!(b.snapshot().cost_rejections, 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = LoopMetrics::new();
        m.inc_operations();
        m.inc_policy_rejections();
        m.flush();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}

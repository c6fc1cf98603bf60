//! Bounded operation history and aggregate statistics.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::result::OperationResult;

/// Aggregates over the results currently held in history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AutonomyStats {
    pub total_operations: usize,
    pub successful_operations: usize,
    /// Percentage, 0..=100.
    pub success_rate: f64,
    pub total_cost: f64,
    pub avg_execution_time_ms: f64,
    pub cache_hits: usize,
}

impl std::fmt::Display for AutonomyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} operations, {} succeeded ({:.1}%), total cost {:.2}, avg {:.1}ms, {} cache hits",
            self.total_operations,
            self.successful_operations,
            self.success_rate,
            self.total_cost,
            self.avg_execution_time_ms,
            self.cache_hits
        )
    }
}

/// Ring buffer of completed operations, oldest first.
#[derive(Debug, Clone)]
pub struct OperationHistory {
    capacity: usize,
    entries: VecDeque<OperationResult>,
}

impl OperationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shrinking drops the oldest entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    pub fn push(&mut self, result: OperationResult) {
        self.entries.push_back(result);
        self.trim();
    }

    /// The last `limit` results, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<OperationResult> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> AutonomyStats {
        let total = self.entries.len();
        if total == 0 {
            return AutonomyStats::default();
        }
        let successful = self.entries.iter().filter(|r| r.success).count();
        let total_cost = self.entries.iter().map(|r| r.cost).sum();
        let total_time: u64 = self.entries.iter().map(|r| r.execution_time_ms).sum();
        let cache_hits = self.entries.iter().filter(|r| r.cache_hit).count();

        AutonomyStats {
            total_operations: total,
            successful_operations: successful,
            success_rate: successful as f64 * 100.0 / total as f64,
            total_cost,
            avg_execution_time_ms: total_time as f64 / total as f64,
            cache_hits,
        }
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

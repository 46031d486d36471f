//! Engine metrics.
//!
//! Running totals plus a bounded ring buffer of recent operations. Rolling
//! latency and throughput are computed from the ring buffer, so they reflect
//! recent behaviour rather than the lifetime of the engine.

use gamesync_types::{OperationId, OperationType, StatePath, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Ring buffer ceiling; exceeding it trims back to [`RECENT_TRIM_TO`].
pub const RECENT_CAPACITY: usize = 1000;
pub const RECENT_TRIM_TO: usize = 500;

/// One processed operation, kept for introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: OperationId,
    pub op_type: OperationType,
    pub path: Option<StatePath>,
    pub source: String,
    pub version: u64,
    pub recorded_at: Timestamp,
    pub latency: Duration,
    pub success: bool,
    pub applied: bool,
    pub conflicted: bool,
}

/// A point-in-time view of engine metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub conflicts: u64,
    /// conflicts / total_operations.
    pub conflict_rate: f64,
    /// Mean latency over the recent-operations buffer (ms).
    pub average_latency_ms: f64,
    /// Operations per second over the metrics window.
    pub throughput_per_sec: f64,
    pub recent_operations: usize,
    pub queue_len: usize,
    pub pending_conflicts: usize,
}

/// Accumulates metrics as operations settle.
#[derive(Debug)]
pub struct MetricsTracker {
    total: u64,
    successes: u64,
    failures: u64,
    conflicts: u64,
    recent: VecDeque<OperationRecord>,
    window: Duration,
}

impl MetricsTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            total: 0,
            successes: 0,
            failures: 0,
            conflicts: 0,
            recent: VecDeque::new(),
            window,
        }
    }

    /// Records a settled operation.
    pub fn record(&mut self, record: OperationRecord, conflict_count: usize) {
        self.total += 1;
        if record.success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.conflicts += conflict_count as u64;

        self.recent.push_back(record);
        if self.recent.len() > RECENT_CAPACITY {
            let excess = self.recent.len() - RECENT_TRIM_TO;
            self.recent.drain(..excess);
        }
    }

    /// Returns the recent operations, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &OperationRecord> {
        self.recent.iter()
    }

    /// Computes a snapshot as of `now`.
    pub fn snapshot(&self, now: Timestamp) -> SyncMetrics {
        let average_latency_ms = if self.recent.is_empty() {
            0.0
        } else {
            let sum: f64 = self
                .recent
                .iter()
                .map(|r| r.latency.as_secs_f64() * 1000.0)
                .sum();
            sum / self.recent.len() as f64
        };

        let window_start = now.saturating_sub(self.window);
        let in_window = self
            .recent
            .iter()
            .filter(|r| r.recorded_at >= window_start)
            .count();
        let window_secs = self.window.as_secs_f64();
        let throughput_per_sec = if window_secs > 0.0 {
            in_window as f64 / window_secs
        } else {
            0.0
        };

        let conflict_rate = if self.total == 0 {
            0.0
        } else {
            self.conflicts as f64 / self.total as f64
        };

        SyncMetrics {
            total_operations: self.total,
            successful_operations: self.successes,
            failed_operations: self.failures,
            conflicts: self.conflicts,
            conflict_rate,
            average_latency_ms,
            throughput_per_sec,
            recent_operations: self.recent.len(),
            queue_len: 0,
            pending_conflicts: 0,
        }
    }
}

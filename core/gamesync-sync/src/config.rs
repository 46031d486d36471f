//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When operations are committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Commit synchronously on every call.
    #[default]
    Immediate,
    /// Queue operations; drain on the timer or as soon as a full batch is queued.
    Batched,
    /// Queue operations; drain only on the timer.
    Scheduled,
}

/// Consistency level requested by the deployment.
///
/// Informational except that `Strong` forces the immediate strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    #[default]
    Eventual,
    Strong,
    Causal,
}

/// How a detected conflict is settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ResolutionPolicy {
    /// Keep the current authoritative value.
    ClientWins,
    /// Keep the incoming value.
    ServerWins,
    /// Keep whichever write carries the later wall-clock timestamp.
    #[default]
    TimestampWins,
    /// Shallow object union, incoming keys win.
    Merge,
    /// Queue the conflict for an operator and do not apply.
    Manual,
}

impl From<String> for ResolutionPolicy {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "client_wins" => Self::ClientWins,
            "server_wins" => Self::ServerWins,
            "timestamp_wins" => Self::TimestampWins,
            "merge" => Self::Merge,
            // Anything unrecognized is settled by hand.
            _ => Self::Manual,
        }
    }
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub strategy: SyncStrategy,
    /// Maximum operations drained per batch tick.
    pub batch_size: usize,
    /// Interval between batch drains (ms).
    pub batch_interval_ms: u64,
    pub conflict_resolution: ResolutionPolicy,
    pub consistency_level: ConsistencyLevel,
    /// Window used for throughput metrics (ms).
    pub metrics_window_ms: u64,
    /// Capacity of the manual-resolution queue.
    pub max_pending_conflicts: usize,
    /// Age after which unresolved manual conflicts are purged (ms).
    pub conflict_ttl_ms: u64,
    /// Capacity of the operation queue.
    pub max_queue_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::Immediate,
            batch_size: 50,
            batch_interval_ms: 100,
            conflict_resolution: ResolutionPolicy::TimestampWins,
            consistency_level: ConsistencyLevel::Eventual,
            metrics_window_ms: 60_000,
            max_pending_conflicts: 100,
            conflict_ttl_ms: 5 * 60 * 1000,
            max_queue_len: 10_000,
        }
    }
}

impl SyncConfig {
    /// The strategy actually in force after applying the consistency level.
    #[must_use]
    pub fn effective_strategy(&self) -> SyncStrategy {
        if self.consistency_level == ConsistencyLevel::Strong {
            SyncStrategy::Immediate
        } else {
            self.strategy
        }
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn metrics_window(&self) -> Duration {
        Duration::from_millis(self.metrics_window_ms)
    }

    pub fn conflict_ttl(&self) -> Duration {
        Duration::from_millis(self.conflict_ttl_ms)
    }
}

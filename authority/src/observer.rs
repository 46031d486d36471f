//! Engine observer that reports to the log.

use gamesync_sync::{SyncConflict, SyncFailure, SyncObserver};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_conflict(&self, conflict: &SyncConflict) {
        info!(
            "Conflict {} at `{}` ({:?}): {}",
            conflict.id, conflict.path, conflict.resolution, conflict.reason
        );
    }

    fn on_sync_error(&self, failure: &SyncFailure) {
        warn!(
            "Operation {} at `{}` failed: {}",
            failure.operation_id, failure.path, failure.error
        );
    }
}

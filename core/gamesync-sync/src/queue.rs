//! Priority operation queue for the batched strategies.

use crate::result::SyncResult;
use gamesync_types::{OperationId, Priority, SyncOperation};
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// A queued operation and, optionally, someone waiting for its result.
#[derive(Debug)]
pub struct QueuedOperation {
    pub operation: SyncOperation,
    pub waiter: Option<oneshot::Sender<SyncResult>>,
}

/// One FIFO lane per priority; pops drain the highest lane first.
#[derive(Debug, Default)]
pub struct OperationQueue {
    lanes: [VecDeque<QueuedOperation>; 4],
}

fn lane(priority: Priority) -> usize {
    match priority {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Normal => 2,
        Priority::Low => 3,
    }
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueuedOperation) {
        let idx = lane(entry.operation.metadata.priority);
        self.lanes[idx].push_back(entry);
    }

    /// Takes up to `max` entries, highest priority first, FIFO within a lane.
    pub fn pop_batch(&mut self, max: usize) -> Vec<QueuedOperation> {
        let mut batch = Vec::with_capacity(max.min(self.len()));
        for priority in Priority::DESCENDING {
            let queue = &mut self.lanes[lane(priority)];
            while batch.len() < max {
                match queue.pop_front() {
                    Some(entry) => batch.push(entry),
                    None => break,
                }
            }
        }
        batch
    }

    /// Removes the entry for operation `id`, wherever it waits.
    pub fn remove(&mut self, id: OperationId) -> Option<QueuedOperation> {
        self.lanes.iter_mut().find_map(|lane| {
            let pos = lane.iter().position(|e| e.operation.id == id)?;
            lane.remove(pos)
        })
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }
}

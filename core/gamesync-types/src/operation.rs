//! Mutation descriptors.
//!
//! A `SyncOperation` is the unit of synchronization: one write at one path
//! of the state tree, stamped with the writer's per-path version. The core
//! never interprets the values it carries.

use crate::{OperationId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// What kind of write an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Creates a value at a path that may not exist yet.
    Create,
    /// Replaces the value at a path.
    Update,
    /// Removes the value at a path.
    Delete,
    /// Writes several children of `path` at once. `new_value` is an object
    /// whose keys are relative paths.
    Batch,
}

/// Scheduling priority; higher priorities drain first from the batch queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// All priorities, highest first.
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];
}

/// Metadata attached to every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Who produced the write (player id, "server", "ai", ...).
    pub source: String,
    /// Writer's version for `path`; must be strictly greater than the last
    /// committed version to apply without conflict.
    pub version: u64,
    /// Operations this one logically follows, in order.
    #[serde(default)]
    pub dependencies: Vec<OperationId>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl OperationMetadata {
    /// Creates metadata with normal priority and no dependencies.
    pub fn new(source: impl Into<String>, version: u64) -> Self {
        Self {
            source: source.into(),
            version,
            dependencies: Vec::new(),
            priority: Priority::Normal,
            tags: BTreeSet::new(),
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: OperationId) -> Self {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// A single state mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OperationId,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Dot-addressed location in the state tree.
    pub path: String,
    /// Value the writer believed was stored before the write.
    #[serde(default)]
    pub old_value: Option<Value>,
    /// Value to write; absent for deletes.
    #[serde(default)]
    pub new_value: Option<Value>,
    pub timestamp: Timestamp,
    pub metadata: OperationMetadata,
}

impl SyncOperation {
    /// Creates a new operation stamped with the current time.
    #[must_use]
    pub fn new(
        op_type: OperationType,
        path: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
        metadata: OperationMetadata,
    ) -> Self {
        Self {
            id: OperationId::new(),
            op_type,
            path: path.into(),
            old_value,
            new_value,
            timestamp: Timestamp::now(),
            metadata,
        }
    }

    /// Creates an update operation.
    #[must_use]
    pub fn update(path: impl Into<String>, new_value: Value, metadata: OperationMetadata) -> Self {
        Self::new(OperationType::Update, path, None, Some(new_value), metadata)
    }

    /// Creates a create operation.
    #[must_use]
    pub fn create(path: impl Into<String>, new_value: Value, metadata: OperationMetadata) -> Self {
        Self::new(OperationType::Create, path, None, Some(new_value), metadata)
    }

    /// Creates a delete operation.
    #[must_use]
    pub fn delete(path: impl Into<String>, metadata: OperationMetadata) -> Self {
        Self::new(OperationType::Delete, path, None, None, metadata)
    }

    /// Creates a batch operation writing each member of `members` under `path`.
    #[must_use]
    pub fn batch(path: impl Into<String>, members: Value, metadata: OperationMetadata) -> Self {
        Self::new(OperationType::Batch, path, None, Some(members), metadata)
    }

    /// Overrides the timestamp (for replay and tests).
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Records the value the writer saw before the write.
    #[must_use]
    pub fn with_old_value(mut self, old_value: Value) -> Self {
        self.old_value = Some(old_value);
        self
    }

    /// Shorthand for `metadata.version`.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.metadata.version
    }
}

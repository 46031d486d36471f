//! Copy-on-write game state.

use crate::StatePath;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;

/// An immutable, cheaply clonable view of the whole game state.
///
/// Cloning shares the underlying tree. Mutation through [`GameState::make_mut`]
/// copies the tree only if another snapshot still references it, so a
/// captured snapshot never observes later writes.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState(Arc<Value>);

impl GameState {
    /// Wraps a JSON tree.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    /// An empty object state.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Value::Object(Default::default()))
    }

    /// Returns the underlying tree.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the value stored at `path`.
    #[must_use]
    pub fn value_at(&self, path: &StatePath) -> Option<&Value> {
        path.get(&self.0)
    }

    /// Returns a mutable tree, cloning it first if it is shared.
    pub fn make_mut(&mut self) -> &mut Value {
        Arc::make_mut(&mut self.0)
    }

    /// Returns true if both snapshots share the same tree allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Unwraps into an owned tree (cloning if shared).
    #[must_use]
    pub fn into_value(self) -> Value {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for GameState {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl Serialize for GameState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GameState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::new)
    }
}

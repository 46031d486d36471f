//! Built-in rules.

mod board;
mod economy;
mod player;
mod structure;
mod timing;

pub use board::{OwnerExistsRule, PositionRangeRule};
pub use economy::NonNegativeMoneyRule;
pub use player::{CurrentPlayerRule, UniquePlayerIdsRule};
pub use structure::RequiredFieldsRule;
pub use timing::TurnCountersRule;

use crate::error::Result;
use crate::rule::ConsistencyRule;
use gamesync_types::StatePath;
use serde_json::Value;
use std::sync::Arc;

/// The default rule set, in evaluation order.
pub fn defaults(board_size: u64) -> Vec<Arc<dyn ConsistencyRule>> {
    vec![
        Arc::new(RequiredFieldsRule::default()),
        Arc::new(CurrentPlayerRule),
        Arc::new(UniquePlayerIdsRule),
        Arc::new(NonNegativeMoneyRule),
        Arc::new(OwnerExistsRule),
        Arc::new(PositionRangeRule::new(board_size)),
        Arc::new(TurnCountersRule),
    ]
}

/// The `players` array, or nothing.
pub(crate) fn players(state: &Value) -> &[Value] {
    state
        .get("players")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Writes `value` at a violation's path.
pub(crate) fn overwrite(state: &mut Value, path: &str, value: Value) -> Result<()> {
    StatePath::parse(path)?.set(state, value)?;
    Ok(())
}

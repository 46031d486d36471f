use super::{overwrite, players};
use crate::error::Result;
use crate::rule::{ConsistencyContext, ConsistencyRule, ConsistencyViolation, Impact, RuleCategory, Severity};
use serde_json::{json, Value};
use std::collections::HashMap;

/// `currentPlayerIndex` addresses an existing player.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentPlayerRule;

impl ConsistencyRule for CurrentPlayerRule {
    fn id(&self) -> &str {
        "player.current_index"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Player
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn description(&self) -> &str {
        "current player index is within the roster"
    }

    fn check(&self, state: &Value, _context: &ConsistencyContext) -> Vec<ConsistencyViolation> {
        let Some(index) = state.get("currentPlayerIndex") else {
            return Vec::new();
        };
        let count = players(state).len() as u64;
        let in_range = match index.as_u64() {
            Some(i) => i < count || (count == 0 && i == 0),
            None => false,
        };
        if in_range {
            return Vec::new();
        }
        vec![ConsistencyViolation::new(
            self,
            "currentPlayerIndex",
            format!("current player index {index} outside 0..{count}"),
        )
        .expected(json!({ "min": 0, "max": count.saturating_sub(1) }))
        .actual(index.clone())
        .fixable()]
    }

    fn can_auto_fix(&self) -> bool {
        true
    }

    fn auto_fix(&self, state: &mut Value, violation: &ConsistencyViolation) -> Result<()> {
        overwrite(state, &violation.path, json!(0))
    }
}

/// Player ids are unique.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniquePlayerIdsRule;

impl ConsistencyRule for UniquePlayerIdsRule {
    fn id(&self) -> &str {
        "player.unique_ids"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Player
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn check(&self, state: &Value, _context: &ConsistencyContext) -> Vec<ConsistencyViolation> {
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        let mut found = Vec::new();
        for (i, player) in players(state).iter().enumerate() {
            let Some(id) = player.get("id") else {
                found.push(
                    ConsistencyViolation::new(self, format!("players[{i}].id"), "player without id")
                        .impact(Impact::GameBreaking),
                );
                continue;
            };
            let key = id.to_string();
            if let Some(first) = first_seen.get(&key) {
                found.push(
                    ConsistencyViolation::new(
                        self,
                        format!("players[{i}].id"),
                        format!("player id {id} already used by players[{first}]"),
                    )
                    .actual(id.clone())
                    .impact(Impact::GameBreaking),
                );
            } else {
                first_seen.insert(key, i);
            }
        }
        found
    }
}

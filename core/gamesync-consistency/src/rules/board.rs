use super::{overwrite, players};
use crate::error::{Result, ValidationError};
use crate::rule::{ConsistencyContext, ConsistencyRule, ConsistencyViolation, Impact, RuleCategory, Severity};
use serde_json::{json, Value};
use std::collections::HashSet;

/// Property owners reference existing players.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerExistsRule;

impl ConsistencyRule for OwnerExistsRule {
    fn id(&self) -> &str {
        "board.owner_exists"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Board
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, state: &Value, _context: &ConsistencyContext) -> Vec<ConsistencyViolation> {
        let Some(properties) = state.get("properties").and_then(Value::as_array) else {
            return Vec::new();
        };
        let ids: HashSet<String> = players(state)
            .iter()
            .filter_map(|p| p.get("id"))
            .map(Value::to_string)
            .collect();

        properties
            .iter()
            .enumerate()
            .filter_map(|(i, property)| {
                let owner = property.get("owner").filter(|o| !o.is_null())?;
                (!ids.contains(&owner.to_string())).then(|| {
                    ConsistencyViolation::new(
                        self,
                        format!("properties[{i}].owner"),
                        format!("owner {owner} is not a player"),
                    )
                    .expected(Value::Null)
                    .actual(owner.clone())
                    .fixable()
                })
            })
            .collect()
    }

    fn can_auto_fix(&self) -> bool {
        true
    }

    fn auto_fix(&self, state: &mut Value, violation: &ConsistencyViolation) -> Result<()> {
        overwrite(state, &violation.path, Value::Null)
    }
}

/// Player positions lie on the board.
#[derive(Debug, Clone, Copy)]
pub struct PositionRangeRule {
    board_size: u64,
}

impl PositionRangeRule {
    pub fn new(board_size: u64) -> Self {
        Self {
            board_size: board_size.max(1),
        }
    }
}

impl ConsistencyRule for PositionRangeRule {
    fn id(&self) -> &str {
        "board.position_range"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Board
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, state: &Value, _context: &ConsistencyContext) -> Vec<ConsistencyViolation> {
        let mut found = Vec::new();
        for (i, player) in players(state).iter().enumerate() {
            let Some(position) = player.get("position") else {
                continue;
            };
            if position.as_u64().is_some_and(|p| p < self.board_size) {
                continue;
            }
            found.push(
                ConsistencyViolation::new(
                    self,
                    format!("players[{i}].position"),
                    format!("position {position} is off the board"),
                )
                .expected(json!({ "min": 0, "max": self.board_size - 1 }))
                .actual(position.clone())
                .impact(Impact::Cosmetic)
                .fixable(),
            );
        }
        found
    }

    fn can_auto_fix(&self) -> bool {
        true
    }

    /// Wraps integer positions around the board; anything else goes to 0.
    fn auto_fix(&self, state: &mut Value, violation: &ConsistencyViolation) -> Result<()> {
        let size = i64::try_from(self.board_size)
            .map_err(|_| ValidationError::FixFailed("board size out of range".into()))?;
        let wrapped = violation
            .actual
            .as_ref()
            .and_then(Value::as_i64)
            .map_or(0, |p| p.rem_euclid(size));
        overwrite(state, &violation.path, json!(wrapped))
    }
}

use super::{overwrite, players};
use crate::error::Result;
use crate::rule::{ConsistencyContext, ConsistencyRule, ConsistencyViolation, RuleCategory, Severity};
use serde_json::{json, Value};

/// Player balances are non-negative numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonNegativeMoneyRule;

impl ConsistencyRule for NonNegativeMoneyRule {
    fn id(&self) -> &str {
        "economy.non_negative_money"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Economy
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, state: &Value, _context: &ConsistencyContext) -> Vec<ConsistencyViolation> {
        let mut found = Vec::new();
        for (i, player) in players(state).iter().enumerate() {
            let Some(money) = player.get("money") else {
                continue;
            };
            let path = format!("players[{i}].money");
            match money.as_f64() {
                Some(m) if m < 0.0 => found.push(
                    ConsistencyViolation::new(self, path, format!("negative balance {money}"))
                        .expected(json!(0))
                        .actual(money.clone())
                        .fixable(),
                ),
                Some(_) => {}
                None => found.push(
                    ConsistencyViolation::new(self, path, "balance is not a number")
                        .actual(money.clone()),
                ),
            }
        }
        found
    }

    fn can_auto_fix(&self) -> bool {
        true
    }

    fn auto_fix(&self, state: &mut Value, violation: &ConsistencyViolation) -> Result<()> {
        overwrite(state, &violation.path, json!(0))
    }
}

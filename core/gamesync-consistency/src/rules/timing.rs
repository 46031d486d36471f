use super::overwrite;
use crate::error::Result;
use crate::rule::{ConsistencyContext, ConsistencyRule, ConsistencyViolation, RuleCategory, Severity};
use serde_json::{json, Value};

const COUNTERS: [&str; 2] = ["turn", "round"];

/// Turn and round counters are non-negative integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnCountersRule;

impl ConsistencyRule for TurnCountersRule {
    fn id(&self) -> &str {
        "timing.counters"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Timing
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, state: &Value, _context: &ConsistencyContext) -> Vec<ConsistencyViolation> {
        COUNTERS
            .iter()
            .filter_map(|&field| {
                let value = state.get(field)?;
                value.as_u64().is_none().then(|| {
                    ConsistencyViolation::new(self, field, format!("`{field}` must be a non-negative integer"))
                        .expected(json!(0))
                        .actual(value.clone())
                        .fixable()
                })
            })
            .collect()
    }

    fn can_auto_fix(&self) -> bool {
        true
    }

    /// Truncates non-negative numbers; everything else resets to 0.
    fn auto_fix(&self, state: &mut Value, violation: &ConsistencyViolation) -> Result<()> {
        let repaired = violation
            .actual
            .as_ref()
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map_or(0, |n| n.trunc() as u64);
        overwrite(state, &violation.path, json!(repaired))
    }
}

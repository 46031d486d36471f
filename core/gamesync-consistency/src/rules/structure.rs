use super::overwrite;
use crate::error::{Result, ValidationError};
use crate::rule::{ConsistencyContext, ConsistencyRule, ConsistencyViolation, Impact, RuleCategory, Severity};
use serde_json::{json, Value};

/// Required top-level fields are present; `players` is an array.
#[derive(Debug, Clone)]
pub struct RequiredFieldsRule {
    fields: Vec<String>,
}

impl RequiredFieldsRule {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for RequiredFieldsRule {
    fn default() -> Self {
        Self::new(["id", "players"])
    }
}

impl ConsistencyRule for RequiredFieldsRule {
    fn id(&self) -> &str {
        "structure.required_fields"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structure
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn description(&self) -> &str {
        "required top-level fields are present"
    }

    fn check(&self, state: &Value, _context: &ConsistencyContext) -> Vec<ConsistencyViolation> {
        let Some(root) = state.as_object() else {
            return vec![ConsistencyViolation::new(self, "", "state is not an object")
                .actual(state.clone())
                .impact(Impact::GameBreaking)];
        };

        let mut found = Vec::new();
        for field in &self.fields {
            match root.get(field) {
                None => {
                    let v = ConsistencyViolation::new(self, field.as_str(), format!("missing `{field}`"))
                        .impact(Impact::GameBreaking);
                    // Only a missing roster can be filled in.
                    found.push(if field == "players" { v.expected(json!([])).fixable() } else { v });
                }
                Some(value) if field == "players" && !value.is_array() => {
                    found.push(
                        ConsistencyViolation::new(self, "players", "`players` is not an array")
                            .actual(value.clone())
                            .impact(Impact::GameBreaking),
                    );
                }
                Some(_) => {}
            }
        }
        found
    }

    fn can_auto_fix(&self) -> bool {
        true
    }

    fn auto_fix(&self, state: &mut Value, violation: &ConsistencyViolation) -> Result<()> {
        if violation.path != "players" || state.get("players").is_some() {
            return Err(ValidationError::NotFixable(violation.path.clone()));
        }
        overwrite(state, "players", json!([]))
    }
}

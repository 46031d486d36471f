//! The rule trait and the violation model.

use crate::error::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Area of the game state a rule covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleCategory {
    Structure,
    Player,
    Board,
    Economy,
    Timing,
    Custom(String),
}

impl RuleCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Structure => "structure",
            Self::Player => "player",
            Self::Board => "board",
            Self::Economy => "economy",
            Self::Timing => "timing",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for RuleCategory {
    fn from(s: String) -> Self {
        match s.as_str() {
            "structure" => Self::Structure,
            "player" => Self::Player,
            "board" => Self::Board,
            "economy" => Self::Economy,
            "timing" => Self::Timing,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for RuleCategory {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<RuleCategory> for String {
    fn from(c: RuleCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a violation is. Ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Critical and error violations make a state invalid.
    pub fn blocks_validity(self) -> bool {
        matches!(self, Self::Critical | Self::Error)
    }
}

/// What a violation does to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    GameBreaking,
    LogicError,
    Performance,
    Cosmetic,
}

/// One finding of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyViolation {
    pub rule_id: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub path: String,
    pub message: String,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
    pub fixable: bool,
    pub impact: Impact,
}

impl ConsistencyViolation {
    /// Creates a violation reported by `rule` at `path`.
    pub fn new(rule: &dyn ConsistencyRule, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule.id().to_string(),
            category: rule.category(),
            severity: rule.severity(),
            path: path.into(),
            message: message.into(),
            expected: None,
            actual: None,
            fixable: false,
            impact: Impact::LogicError,
        }
    }

    #[must_use]
    pub fn expected(mut self, value: Value) -> Self {
        self.expected = Some(value);
        self
    }

    #[must_use]
    pub fn actual(mut self, value: Value) -> Self {
        self.actual = Some(value);
        self
    }

    #[must_use]
    pub fn fixable(mut self) -> Self {
        self.fixable = true;
        self
    }

    #[must_use]
    pub fn impact(mut self, impact: Impact) -> Self {
        self.impact = impact;
        self
    }

    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Inputs that shape a check besides the snapshot itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyContext {
    /// Categories to evaluate. Empty means all.
    pub categories: Vec<RuleCategory>,
    /// Free-form label of who asked (logged, part of the cache key).
    pub trigger: Option<String>,
}

impl ConsistencyContext {
    pub fn for_categories(categories: impl IntoIterator<Item = RuleCategory>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
            trigger: None,
        }
    }

    pub fn includes(&self, category: &RuleCategory) -> bool {
        self.categories.is_empty() || self.categories.contains(category)
    }
}

/// A pure check over a state snapshot.
///
/// `check` must depend on nothing but its arguments; the validator caches
/// results on that assumption.
pub trait ConsistencyRule: Send + Sync {
    fn id(&self) -> &str;

    fn category(&self) -> RuleCategory;

    fn severity(&self) -> Severity;

    fn description(&self) -> &str {
        ""
    }

    /// Returns every violation found in `state`.
    fn check(&self, state: &Value, context: &ConsistencyContext) -> Vec<ConsistencyViolation>;

    fn can_auto_fix(&self) -> bool {
        false
    }

    /// Repairs `violation` in place.
    fn auto_fix(&self, state: &mut Value, violation: &ConsistencyViolation) -> Result<()> {
        let _ = state;
        Err(ValidationError::NotFixable(violation.path.clone()))
    }
}

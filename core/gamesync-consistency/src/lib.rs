//! Consistency validation for GameSync state.
//!
//! A [`ConsistencyValidator`] runs registered [`ConsistencyRule`]s over a
//! snapshot and reports severity-tagged violations. Rules may repair what
//! they report; repairs always land on a copy.
//!
//! ```
//! use gamesync_consistency::{ConsistencyContext, ConsistencyValidator, ValidatorConfig};
//! use gamesync_types::GameState;
//! use serde_json::json;
//!
//! let validator = ConsistencyValidator::with_default_rules(ValidatorConfig::default());
//! let state = GameState::new(json!({
//!     "id": "g1",
//!     "players": [{"id": "a"}, {"id": "b"}],
//!     "currentPlayerIndex": 999,
//! }));
//!
//! let result = validator.check_consistency(&state, &ConsistencyContext::default());
//! assert!(!result.is_valid);
//!
//! let fix = validator.auto_fix_violations(&state, &result.violations);
//! assert!(fix.all_fixed());
//! assert_eq!(fix.state.as_value()["currentPlayerIndex"], 0);
//! ```

mod error;
mod result;
pub mod rule;
pub mod rules;
mod validator;

pub use error::{Result, ValidationError};
pub use result::{ConsistencyMetrics, ConsistencyResult, FixResult, RuleMetrics};
pub use rule::{ConsistencyContext, ConsistencyRule, ConsistencyViolation, Impact, RuleCategory, Severity};
pub use validator::{ConsistencyValidator, ValidatorConfig};

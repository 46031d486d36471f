//! The consistency validator.

use crate::error::{Result, ValidationError};
use crate::result::{ConsistencyMetrics, ConsistencyResult, FixResult, RuleMetrics};
use crate::rule::{ConsistencyContext, ConsistencyRule, ConsistencyViolation};
use crate::rules;
use gamesync_types::{GameState, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound on cached results.
const CACHE_CAPACITY: usize = 256;

/// Top-level fields that identify a snapshot for caching.
const IDENTITY_FIELDS: [&str; 6] = ["id", "turn", "round", "phase", "status", "lastUpdate"];

/// Validator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Bypass the result cache entirely.
    pub strict_mode: bool,
    /// Stop evaluating once this many violations were collected.
    pub max_violations: usize,
    /// Wall-clock budget for one check.
    pub timeout_ms: u64,
    pub cache_ttl_ms: u64,
    /// Board size assumed by the position rule.
    pub board_size: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_violations: 100,
            timeout_ms: 5_000,
            cache_ttl_ms: 30_000,
            board_size: 40,
        }
    }
}

impl ValidatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

struct CacheEntry {
    stored_at: Instant,
    result: ConsistencyResult,
}

/// Runs registered rules over snapshots and repairs what it can.
pub struct ConsistencyValidator {
    config: ValidatorConfig,
    rules: Vec<Arc<dyn ConsistencyRule>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl ConsistencyValidator {
    /// Creates a validator with no rules.
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            rules: Vec::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a validator with the built-in rule set.
    pub fn with_default_rules(config: ValidatorConfig) -> Self {
        let board_size = config.board_size;
        let mut validator = Self::new(config);
        for rule in rules::defaults(board_size) {
            // Built-in ids are unique.
            let _ = validator.register_rule(rule);
        }
        validator
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn register_rule(&mut self, rule: Arc<dyn ConsistencyRule>) -> Result<()> {
        if self.rules.iter().any(|r| r.id() == rule.id()) {
            return Err(ValidationError::DuplicateRule(rule.id().to_string()));
        }
        debug!("Registered rule {} ({})", rule.id(), rule.category());
        self.rules.push(rule);
        self.invalidate_cache();
        Ok(())
    }

    pub fn unregister_rule(&mut self, id: &str) -> Result<Arc<dyn ConsistencyRule>> {
        let idx = self
            .rules
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| ValidationError::RuleNotFound(id.to_string()))?;
        self.invalidate_cache();
        Ok(self.rules.remove(idx))
    }

    /// Registered rule ids, in evaluation order.
    pub fn rules(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    pub fn invalidate_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Checks `snapshot` against every rule the context selects.
    ///
    /// Evaluation stops early at the violation cap or the time budget; the
    /// metrics say which.
    pub fn check_consistency(&self, snapshot: &GameState, context: &ConsistencyContext) -> ConsistencyResult {
        let key = (!self.config.strict_mode).then(|| cache_key(snapshot.as_value(), context));
        if let Some(hit) = key.as_deref().and_then(|k| self.cached(k)) {
            debug!("Consistency cache hit");
            return hit;
        }

        let result = self.evaluate(snapshot.as_value(), context);
        if let Some(key) = key {
            self.store(key, &result);
        }
        result
    }

    fn evaluate(&self, state: &Value, context: &ConsistencyContext) -> ConsistencyResult {
        let started = Instant::now();
        let timeout = self.config.timeout();
        let cap = self.config.max_violations;
        let mut metrics = ConsistencyMetrics::default();
        let mut violations: Vec<ConsistencyViolation> = Vec::new();

        for rule in self.rules.iter().filter(|r| context.includes(&r.category())) {
            if violations.len() >= cap {
                metrics.truncated = true;
                break;
            }
            if started.elapsed() >= timeout {
                warn!("Consistency check hit its {:?} budget", timeout);
                metrics.timed_out = true;
                break;
            }

            let rule_started = Instant::now();
            let found = rule.check(state, context);
            metrics.rules_evaluated += 1;
            metrics.rules.push(RuleMetrics {
                rule_id: rule.id().to_string(),
                violations: found.len(),
                elapsed: rule_started.elapsed(),
            });

            for violation in found {
                if violations.len() >= cap {
                    metrics.truncated = true;
                    break;
                }
                metrics.count(&violation);
                violations.push(violation);
            }
        }

        metrics.elapsed = started.elapsed();
        let is_valid = !violations.iter().any(|v| v.severity.blocks_validity());
        if !is_valid {
            info!(
                "State invalid: {} critical, {} error violations",
                metrics.critical, metrics.errors
            );
        }
        ConsistencyResult {
            is_valid,
            violations,
            metrics,
            checked_at: Timestamp::now(),
        }
    }

    fn cached(&self, key: &str) -> Option<ConsistencyResult> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|e| e.stored_at.elapsed() < self.config.cache_ttl())
            .map(|e| e.result.clone())
    }

    fn store(&self, key: String, result: &ConsistencyResult) {
        let ttl = self.config.cache_ttl();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, e| e.stored_at.elapsed() < ttl);
        if cache.len() >= CACHE_CAPACITY {
            let oldest = cache
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                result: result.clone(),
            },
        );
    }

    /// Repairs what it can of `violations`, in order, on a copy of
    /// `snapshot`.
    ///
    /// Violations that are not fixable, or whose rule is gone or has no fix,
    /// are passed through to `remaining`. A failed fix leaves the working
    /// copy as it was.
    pub fn auto_fix_violations(&self, snapshot: &GameState, violations: &[ConsistencyViolation]) -> FixResult {
        let mut working = snapshot.clone();
        let mut fixed = Vec::new();
        let mut remaining = Vec::new();
        let mut errors = Vec::new();

        for violation in violations {
            let rule = self
                .rules
                .iter()
                .find(|r| r.id() == violation.rule_id)
                .filter(|r| r.can_auto_fix());
            let Some(rule) = rule.filter(|_| violation.fixable) else {
                remaining.push(violation.clone());
                continue;
            };

            let mut trial = working.as_value().clone();
            match rule.auto_fix(&mut trial, violation) {
                Ok(()) => {
                    info!("Fixed {} at `{}`", violation.rule_id, violation.path);
                    working = GameState::new(trial);
                    fixed.push(violation.clone());
                }
                Err(e) => {
                    warn!("Fix for {} at `{}` failed: {}", violation.rule_id, violation.path, e);
                    errors.push(format!("{} at `{}`: {}", violation.rule_id, violation.path, e));
                    remaining.push(violation.clone());
                }
            }
        }

        if !fixed.is_empty() {
            self.invalidate_cache();
        }
        FixResult {
            state: working,
            fixed,
            remaining,
            errors,
        }
    }
}

/// SHA-256 over the snapshot's identity fields and the context.
fn cache_key(state: &Value, context: &ConsistencyContext) -> String {
    let mut hasher = Sha256::new();
    for field in IDENTITY_FIELDS {
        hasher.update(field.as_bytes());
        hasher.update(b"=");
        hasher.update(state.get(field).map(Value::to_string).unwrap_or_default().as_bytes());
        hasher.update(b";");
    }
    let players = state.get("players").and_then(Value::as_array).map_or(0, Vec::len);
    hasher.update(format!("players={players};").as_bytes());
    hasher.update(serde_json::to_vec(context).unwrap_or_default());
    hex::encode(hasher.finalize())
}

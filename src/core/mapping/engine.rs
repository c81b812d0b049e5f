//! Mapping engine
//!
//! Applies a [`MappingConfig`] to a source record in three passes:
//!
//! 1. Every required rule whose source value is absent, null, or an empty
//!    string records `Required field missing: {sourcePath}`.
//! 2. Every rule with a present source value runs its transform (if any),
//!    coerces to the rule's type, and writes at the target path.
//! 3. A rule that fails in step 2 records
//!    `Error mapping field {sourcePath}: {reason}` and mapping continues.

use super::coerce::coerce;
use super::path::{read_path, write_path};
use super::{MappingConfig, MappingError, MappingRule, TransformRegistry};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Result of mapping one record
#[derive(Debug, Clone, PartialEq)]
pub struct MappingOutcome {
    /// The target record built so far (always an object)
    pub target: Value,
    /// Per-rule error strings, in rule order
    pub errors: Vec<String>,
}

impl MappingOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Maps source records using a shared transform registry
#[derive(Debug, Clone)]
pub struct MappingEngine {
    transforms: Arc<TransformRegistry>,
}

impl MappingEngine {
    pub fn new(transforms: Arc<TransformRegistry>) -> Self {
        Self { transforms }
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    /// Map `source` using `config`
    ///
    /// Never fails as a whole; problems are reported in
    /// [`MappingOutcome::errors`].
    pub fn map(&self, source: &Map<String, Value>, config: &MappingConfig) -> MappingOutcome {
        let mut target = Value::Object(config.defaults.clone());
        let mut errors = Vec::new();

        for rule in config.rules.iter().filter(|r| r.required) {
            if present_value(source, &rule.source_path).is_none() {
                errors.push(format!("Required field missing: {}", rule.source_path));
            }
        }

        for rule in &config.rules {
            let Some(value) = present_value(source, &rule.source_path) else {
                continue;
            };
            if let Err(e) = self.apply_rule(rule, value, &mut target) {
                tracing::debug!(
                    mapping_id = %config.id,
                    source_path = %rule.source_path,
                    error = %e,
                    "Mapping rule failed"
                );
                errors.push(format!("Error mapping field {}: {}", rule.source_path, e));
            }
        }

        MappingOutcome { target, errors }
    }

    fn apply_rule(
        &self,
        rule: &MappingRule,
        value: &Value,
        target: &mut Value,
    ) -> Result<(), MappingError> {
        let transformed = match rule.transform_name.as_deref() {
            Some(name) => self.transforms.apply(name, value)?,
            None => value.clone(),
        };
        let coerced = coerce(transformed, rule.value_type)?;
        write_path(target, &rule.target_path, coerced)
    }
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self::new(Arc::new(TransformRegistry::with_builtins()))
    }
}

/// Source value at `path`, treating null and empty strings as absent
fn present_value<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    match read_path(source, path)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        value => Some(value),
    }
}

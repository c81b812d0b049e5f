//! Resource validation
//!
//! Validation dispatches on a resource kind (`Patient`, `Observation`, ...) to
//! a registered list of rule functions. Kinds with no registered rules are
//! trivially valid. New kinds are added with [`ValidatorRegistry::register`].

pub mod observation;
pub mod patient;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Severity of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Error,
    Warning,
}

/// A single problem found in a target record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub field: String,
    pub message: String,
    pub severity: FindingSeverity,
}

impl ValidationFinding {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: FindingSeverity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: FindingSeverity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == FindingSeverity::Error
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub findings: Vec<ValidationFinding>,
}

impl ValidationResult {
    pub fn from_findings(findings: Vec<ValidationFinding>) -> Self {
        Self {
            is_valid: !findings.iter().any(ValidationFinding::is_error),
            findings,
        }
    }

    pub fn valid() -> Self {
        Self::from_findings(Vec::new())
    }

    /// Findings rendered as `field: message` strings
    pub fn messages(&self) -> Vec<String> {
        self.findings.iter().map(ToString::to_string).collect()
    }
}

/// A pure validation rule over a target record
pub type RuleFn = Arc<dyn Fn(&Value) -> Vec<ValidationFinding> + Send + Sync>;

/// Validation rules keyed by resource kind
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    rules_by_kind: BTreeMap<String, Vec<RuleFn>>,
}

impl ValidatorRegistry {
    /// An empty registry; every kind validates trivially
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Patient and Observation rule sets
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        patient::register(&mut registry);
        observation::register(&mut registry);
        registry
    }

    /// Add a rule for a resource kind
    pub fn register<F>(&mut self, kind: &str, rule: F)
    where
        F: Fn(&Value) -> Vec<ValidationFinding> + Send + Sync + 'static,
    {
        self.rules_by_kind
            .entry(kind.to_string())
            .or_default()
            .push(Arc::new(rule));
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.rules_by_kind.keys().map(String::as_str).collect()
    }

    /// Validate `record` as a resource of `kind`
    pub fn validate(&self, kind: &str, record: &Value) -> ValidationResult {
        let Some(rules) = self.rules_by_kind.get(kind) else {
            return ValidationResult::valid();
        };
        let findings = rules.iter().flat_map(|rule| rule(record)).collect();
        ValidationResult::from_findings(findings)
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Non-empty string at `key`, if any
pub(crate) fn non_empty_str<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_kind_is_valid() {
        let registry = ValidatorRegistry::with_builtins();
        let result = registry.validate("Encounter", &json!({}));
        assert!(result.is_valid);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let result = ValidationResult::from_findings(vec![ValidationFinding::warning(
            "id",
            "Resource id is missing",
        )]);
        assert!(result.is_valid);
        assert_eq!(result.messages(), vec!["id: Resource id is missing"]);
    }

    #[test]
    fn test_registered_rule_runs() {
        let mut registry = ValidatorRegistry::new();
        registry.register("Device", |record| {
            if record.get("udi").is_none() {
                vec![ValidationFinding::error("udi", "Device UDI is required")]
            } else {
                Vec::new()
            }
        });

        assert!(!registry.validate("Device", &json!({})).is_valid);
        assert!(registry.validate("Device", &json!({"udi": "x"})).is_valid);
        assert_eq!(registry.kinds(), vec!["Device"]);
    }

    #[test]
    fn test_result_wire_format() {
        let result = ValidationResult::from_findings(vec![ValidationFinding::error("name", "x")]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["findings"][0]["severity"], "error");
    }
}

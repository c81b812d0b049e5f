//! Declarative record mapping
//!
//! A [`MappingConfig`] is an ordered list of [`MappingRule`]s that copy values
//! from a proprietary source record into a target (FHIR-shaped) record. Each
//! rule may run a named transform and coerces the result to a [`ValueType`].
//! Per-rule failures are collected as error strings rather than aborting the
//! run.

pub mod coerce;
pub mod engine;
pub mod path;
pub mod presets;
pub mod transforms;

pub use engine::{MappingEngine, MappingOutcome};
pub use transforms::{TransformFn, TransformRegistry};

use crate::domain::MappingId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Failure while applying a single mapping rule
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    #[error("transform '{name}' failed: {reason}")]
    Transform { name: String, reason: String },

    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("invalid date '{0}'")]
    InvalidDate(String),

    #[error("cannot convert {found} to {target}")]
    Unsupported {
        target: ValueType,
        found: &'static str,
    },

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("path '{path}' conflicts with existing value at segment '{segment}'")]
    PathConflict { path: String, segment: String },

    #[error("sequence index {0} exceeds limit of {max}", max = path::MAX_SEQUENCE_INDEX)]
    IndexTooLarge(usize),
}

/// Target type a mapped value is coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Code,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::Code => "code",
        };
        f.write_str(name)
    }
}

/// One field-level mapping rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    pub source_path: String,
    pub target_path: String,
    #[serde(default, rename = "type", alias = "valueType")]
    pub value_type: ValueType,
    #[serde(
        default,
        rename = "transform",
        alias = "transformName",
        skip_serializing_if = "Option::is_none"
    )]
    pub transform_name: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl MappingRule {
    pub fn new(source_path: &str, target_path: &str, value_type: ValueType) -> Self {
        Self {
            source_path: source_path.to_string(),
            target_path: target_path.to_string(),
            value_type,
            transform_name: None,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_transform(mut self, name: &str) -> Self {
        self.transform_name = Some(name.to_string());
        self
    }
}

/// A named set of mapping rules for one client record format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    pub id: MappingId,
    pub source_format: String,
    pub target_format: String,
    /// Resource kind used to pick validation rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Skeleton the target record starts from before rules are applied
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub defaults: Map<String, Value>,
    pub rules: Vec<MappingRule>,
}

impl MappingConfig {
    /// Structural checks performed when a mapping is loaded
    pub fn validate(&self) -> Result<(), String> {
        if self.source_format.trim().is_empty() {
            return Err(format!("mapping '{}': sourceFormat cannot be empty", self.id));
        }
        if self.target_format.trim().is_empty() {
            return Err(format!("mapping '{}': targetFormat cannot be empty", self.id));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.source_path.split('.').any(str::is_empty) {
                return Err(format!(
                    "mapping '{}': rule {i} has invalid sourcePath '{}'",
                    self.id, rule.source_path
                ));
            }
            if rule.target_path.split('.').any(str::is_empty) {
                return Err(format!(
                    "mapping '{}': rule {i} has invalid targetPath '{}'",
                    self.id, rule.target_path
                ));
            }
        }
        Ok(())
    }

    /// Resource kind of a mapped record under this configuration
    ///
    /// Prefers the configured `resourceType`, then the record's own
    /// `resourceType` field, then the target format name.
    pub fn resource_kind(&self, record: &Value) -> String {
        self.resource_type
            .clone()
            .or_else(|| {
                record
                    .get("resourceType")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.target_format.clone())
    }
}

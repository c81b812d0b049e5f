//! Named value transforms applied by mapping rules

use super::MappingError;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A pure transform from one JSON value to another
pub type TransformFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Registry of transforms referenced by name from mapping rules
#[derive(Clone)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in transforms
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("gender", |v| Ok(Value::String(normalize_gender(v).to_string())));
        registry.register("uppercase", |v| with_str(v, |s| s.to_uppercase()));
        registry.register("lowercase", |v| with_str(v, |s| s.to_lowercase()));
        registry.register("trim", |v| with_str(v, |s| s.trim().to_string()));
        registry.register("patient_reference", patient_reference);
        registry.register("date_dmy", date_dmy);
        registry.register("fahrenheit_to_celsius", fahrenheit_to_celsius);
        registry
    }

    /// Register (or replace) a transform
    pub fn register<F>(&mut self, name: &str, transform: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.transforms.insert(name.to_string(), Arc::new(transform));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Apply the named transform
    pub fn apply(&self, name: &str, value: &Value) -> Result<Value, MappingError> {
        let transform = self
            .transforms
            .get(name)
            .ok_or_else(|| MappingError::UnknownTransform(name.to_string()))?;
        transform(value).map_err(|reason| MappingError::Transform {
            name: name.to_string(),
            reason,
        })
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}

/// Normalize a free-form gender code to the FHIR administrative gender set
///
/// Unrecognized values map to `unknown`.
pub fn normalize_gender(value: &Value) -> &'static str {
    let Some(raw) = value.as_str() else {
        return "unknown";
    };
    match raw.trim().to_lowercase().as_str() {
        "m" | "male" | "masculino" => "male",
        "f" | "female" | "feminino" => "female",
        "o" | "other" | "outro" => "other",
        _ => "unknown",
    }
}

fn with_str(value: &Value, f: impl Fn(&str) -> String) -> Result<Value, String> {
    value
        .as_str()
        .map(|s| Value::String(f(s)))
        .ok_or_else(|| "expected a string".to_string())
}

fn patient_reference(value: &Value) -> Result<Value, String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err("expected a patient identifier".to_string()),
    };
    if id.starts_with("Patient/") {
        Ok(Value::String(id))
    } else {
        Ok(Value::String(format!("Patient/{id}")))
    }
}

fn date_dmy(value: &Value) -> Result<Value, String> {
    let raw = value.as_str().ok_or("expected a DD/MM/YYYY string")?;
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y")
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .map_err(|_| format!("'{raw}' is not a DD/MM/YYYY date"))
}

fn fahrenheit_to_celsius(value: &Value) -> Result<Value, String> {
    let fahrenheit = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or("expected a numeric temperature")?;

    let celsius = ((fahrenheit - 32.0) * 5.0 / 9.0 * 100.0).round() / 100.0;
    serde_json::Number::from_f64(celsius)
        .map(Value::Number)
        .ok_or_else(|| "temperature out of range".to_string())
}

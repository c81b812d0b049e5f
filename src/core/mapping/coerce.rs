//! Value coercion for mapping rules

use super::{MappingError, ValueType};
use crate::domain::job::json_type_name;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Strings that cast to `false`; every other non-empty string is `true`
const FALSE_WORDS: &[&str] = &["false", "0", "no", "n", "off"];

/// Coerce a (possibly transformed) source value to the rule's target type
pub fn coerce(value: Value, value_type: ValueType) -> Result<Value, MappingError> {
    match value_type {
        ValueType::String => Ok(Value::String(stringify(value))),
        ValueType::Code => Ok(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(stringify(other)),
        }),
        ValueType::Number => to_number(value),
        ValueType::Boolean => Ok(Value::Bool(truthy(&value))),
        ValueType::Date => to_iso_date(value),
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn to_number(value: Value) -> Result<Value, MappingError> {
    match value {
        Value::Number(n) => Ok(Value::Number(n)),
        Value::Bool(b) => Ok(Value::from(u8::from(b))),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Ok(Value::from(int));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or(MappingError::NotANumber(s))
        }
        other => Err(MappingError::Unsupported {
            target: ValueType::Number,
            found: json_type_name(&other),
        }),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let normalized = s.trim().to_lowercase();
            !normalized.is_empty() && !FALSE_WORDS.contains(&normalized.as_str())
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_iso_date(value: Value) -> Result<Value, MappingError> {
    let parsed = match &value {
        Value::String(s) => parse_datetime(s.trim()),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };

    parsed
        .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .ok_or_else(|| MappingError::InvalidDate(stringify(value)))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

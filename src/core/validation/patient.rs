//! Patient rules

use super::{non_empty_str, ValidationFinding, ValidatorRegistry};
use chrono::{DateTime, NaiveDate};
use serde_json::Value;

pub const KIND: &str = "Patient";

/// FHIR administrative gender codes
pub const GENDER_CODES: &[&str] = &["male", "female", "other", "unknown"];

pub fn register(registry: &mut ValidatorRegistry) {
    registry.register(KIND, check_name);
    registry.register(KIND, check_gender);
    registry.register(KIND, check_birth_date);
    registry.register(KIND, check_id);
}

fn check_name(record: &Value) -> Vec<ValidationFinding> {
    let has_name = record
        .get("name")
        .and_then(Value::as_array)
        .is_some_and(|names| names.iter().any(is_usable_name));

    if has_name {
        Vec::new()
    } else {
        vec![ValidationFinding::error(
            "name",
            "Patient must have at least one name with family or given",
        )]
    }
}

fn is_usable_name(name: &Value) -> bool {
    let family = non_empty_str(name, "family").is_some();
    let given = name
        .get("given")
        .and_then(Value::as_array)
        .is_some_and(|given| {
            given
                .iter()
                .any(|g| g.as_str().is_some_and(|s| !s.trim().is_empty()))
        });
    family || given
}

fn check_gender(record: &Value) -> Vec<ValidationFinding> {
    match record.get("gender") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(code)) if GENDER_CODES.contains(&code.as_str()) => Vec::new(),
        Some(other) => vec![ValidationFinding::error(
            "gender",
            format!(
                "Invalid gender code {other}; expected one of {}",
                GENDER_CODES.join("|")
            ),
        )],
    }
}

fn check_birth_date(record: &Value) -> Vec<ValidationFinding> {
    let Some(value) = record.get("birthDate").filter(|v| !v.is_null()) else {
        return Vec::new();
    };
    let valid = value.as_str().is_some_and(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok()
    });
    if valid {
        Vec::new()
    } else {
        vec![ValidationFinding::error(
            "birthDate",
            format!("birthDate must be an ISO-8601 date, got {value}"),
        )]
    }
}

fn check_id(record: &Value) -> Vec<ValidationFinding> {
    if non_empty_str(record, "id").is_some() {
        Vec::new()
    } else {
        vec![ValidationFinding::warning("id", "Patient id is missing")]
    }
}

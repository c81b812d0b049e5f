//! Observation rules

use super::{non_empty_str, ValidationFinding, ValidatorRegistry};
use serde_json::Value;

pub const KIND: &str = "Observation";

/// FHIR observation status value set
pub const STATUS_CODES: &[&str] = &[
    "registered",
    "preliminary",
    "final",
    "amended",
    "corrected",
    "cancelled",
    "entered-in-error",
    "unknown",
];

pub fn register(registry: &mut ValidatorRegistry) {
    registry.register(KIND, check_status);
    registry.register(KIND, check_code);
    registry.register(KIND, check_value_quantity);
    registry.register(KIND, check_subject);
}

fn check_status(record: &Value) -> Vec<ValidationFinding> {
    match non_empty_str(record, "status") {
        None => vec![ValidationFinding::error("status", "Observation status is required")],
        Some(status) if STATUS_CODES.contains(&status) => Vec::new(),
        Some(status) => vec![ValidationFinding::error(
            "status",
            format!("Invalid observation status '{status}'"),
        )],
    }
}

fn check_code(record: &Value) -> Vec<ValidationFinding> {
    let Some(code) = record.get("code") else {
        return vec![ValidationFinding::error("code", "Observation code is required")];
    };
    let has_coding = code
        .get("coding")
        .and_then(Value::as_array)
        .is_some_and(|codings| codings.iter().any(|c| non_empty_str(c, "code").is_some()));
    let has_text = non_empty_str(code, "text").is_some();

    if has_coding || has_text {
        Vec::new()
    } else {
        vec![ValidationFinding::error(
            "code",
            "Observation code must carry a coding or text",
        )]
    }
}

fn check_value_quantity(record: &Value) -> Vec<ValidationFinding> {
    match record.pointer("/valueQuantity/value") {
        None | Some(Value::Null) | Some(Value::Number(_)) => Vec::new(),
        Some(other) => vec![ValidationFinding::error(
            "valueQuantity.value",
            format!("Quantity value must be numeric, got {other}"),
        )],
    }
}

fn check_subject(record: &Value) -> Vec<ValidationFinding> {
    let has_reference = record
        .get("subject")
        .is_some_and(|s| non_empty_str(s, "reference").is_some());
    if has_reference {
        Vec::new()
    } else {
        vec![ValidationFinding::warning(
            "subject.reference",
            "Observation has no subject reference",
        )]
    }
}

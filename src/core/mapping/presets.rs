//! Built-in mapping configurations
//!
//! Registered in the mapping store at startup unless disabled with
//! `[mappings] builtin = false`. Client-specific mappings loaded from the
//! mappings directory take precedence over these on an id clash.

use super::{MappingConfig, MappingRule, ValueType};
use crate::domain::MappingId;
use serde_json::{json, Map, Value};

pub const BODY_TEMPERATURE: &str = "body-temperature";
pub const BASIC_PATIENT: &str = "basic-patient";

const OBSERVATION_CATEGORY_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/observation-category";
const LOINC_SYSTEM: &str = "http://loinc.org";
const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// All built-in mappings
pub fn builtin_mappings() -> Vec<MappingConfig> {
    vec![body_temperature(), basic_patient()]
}

/// Body temperature reading as a vital-signs Observation (LOINC 8310-5, Celsius)
///
/// Source: `{patientId, temperature, measuredAt?, temperatureF?}`.
pub fn body_temperature() -> MappingConfig {
    MappingConfig {
        id: builtin_id(BODY_TEMPERATURE),
        source_format: "temperature-reading".to_string(),
        target_format: "Observation".to_string(),
        resource_type: Some("Observation".to_string()),
        defaults: object(json!({
            "resourceType": "Observation",
            "status": "final",
            "category": [{
                "coding": [{
                    "system": OBSERVATION_CATEGORY_SYSTEM,
                    "code": "vital-signs",
                    "display": "Vital Signs"
                }]
            }],
            "code": {
                "coding": [{
                    "system": LOINC_SYSTEM,
                    "code": "8310-5",
                    "display": "Body temperature"
                }]
            },
            "valueQuantity": {
                "unit": "C",
                "system": UCUM_SYSTEM,
                "code": "Cel"
            }
        })),
        rules: vec![
            MappingRule::new("patientId", "subject.reference", ValueType::String)
                .with_transform("patient_reference")
                .required(),
            MappingRule::new("temperature", "valueQuantity.value", ValueType::Number),
            MappingRule::new("temperatureF", "valueQuantity.value", ValueType::Number)
                .with_transform("fahrenheit_to_celsius"),
            MappingRule::new("measuredAt", "effectiveDateTime", ValueType::Date),
        ],
    }
}

/// Minimal demographic record as a Patient
///
/// Source: `{id, gender, familyName, givenName, birthDate (DD/MM/YYYY), phone}`.
pub fn basic_patient() -> MappingConfig {
    MappingConfig {
        id: builtin_id(BASIC_PATIENT),
        source_format: "demographics".to_string(),
        target_format: "Patient".to_string(),
        resource_type: Some("Patient".to_string()),
        defaults: object(json!({"resourceType": "Patient"})),
        rules: vec![
            MappingRule::new("id", "id", ValueType::String).required(),
            MappingRule::new("gender", "gender", ValueType::Code).with_transform("gender"),
            MappingRule::new("familyName", "name.0.family", ValueType::String).required(),
            MappingRule::new("givenName", "name.0.given.0", ValueType::String),
            MappingRule::new("birthDate", "birthDate", ValueType::Code).with_transform("date_dmy"),
            MappingRule::new("phone", "telecom.0.value", ValueType::String),
        ],
    }
}

fn builtin_id(id: &'static str) -> MappingId {
    MappingId::from_static(id)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

//! Dot-separated path addressing into JSON records
//!
//! Reads resolve each segment against whatever container is found (object
//! keys, or sequence positions when the segment is numeric). Writes create
//! missing containers: objects for name segments, sequences for numeric ones.

use super::MappingError;
use serde_json::{Map, Value};

/// Largest sequence index a target path may address
pub const MAX_SEQUENCE_INDEX: usize = 10_000;

/// Read the value at `path` inside a source record
///
/// Returns `None` when any segment is missing or the path is malformed.
pub fn read_path<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next().filter(|s| !s.is_empty())?;
    let mut current = source.get(first)?;

    for segment in segments {
        if segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Write `value` at `path` inside `target`, creating intermediate containers
///
/// # Errors
///
/// Returns an error when the path has empty segments, an existing value of the
/// wrong shape sits on the path, or a sequence index is unreasonably large.
pub fn write_path(target: &mut Value, path: &str, value: Value) -> Result<(), MappingError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(MappingError::InvalidPath(path.to_string()));
    }

    let last = segments.len() - 1;
    let mut current = target;

    for (i, segment) in segments.iter().enumerate() {
        match segment.parse::<usize>() {
            Ok(index) => {
                if index > MAX_SEQUENCE_INDEX {
                    return Err(MappingError::IndexTooLarge(index));
                }
                if current.is_null() {
                    *current = Value::Array(Vec::new());
                }
                let items = current
                    .as_array_mut()
                    .ok_or_else(|| conflict(path, segment))?;
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                if i == last {
                    items[index] = value;
                    return Ok(());
                }
                current = &mut items[index];
            }
            Err(_) => {
                if current.is_null() {
                    *current = Value::Object(Map::new());
                }
                let map = current
                    .as_object_mut()
                    .ok_or_else(|| conflict(path, segment))?;
                if i == last {
                    map.insert((*segment).to_string(), value);
                    return Ok(());
                }
                current = map.entry((*segment).to_string()).or_insert(Value::Null);
            }
        }
    }

    Ok(())
}

fn conflict(path: &str, segment: &str) -> MappingError {
    MappingError::PathConflict {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}

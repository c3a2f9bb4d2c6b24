//! JSON and YAML encoding of run artifacts.
//!
//! Run reports, JSON batch files and parameter hashes go through
//! [`to_canonical_json_bytes`], which emits compact JSON with every object's
//! keys in lexicographic order. Identical values therefore hash identically.

use std::mem;

use qf_core::errors::{ErrorInfo, QfError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

fn encoding_error(code: &str, err: impl ToString) -> QfError {
    QfError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn sort_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = mem::take(map).into_iter().collect();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            for (key, mut item) in entries {
                sort_keys(&mut item);
                map.insert(key, item);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sort_keys),
        _ => {}
    }
}

/// Encodes `value` as compact JSON with sorted object keys.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, QfError> {
    let mut tree = serde_json::to_value(value).map_err(|err| encoding_error("json-encode", err))?;
    sort_keys(&mut tree);
    serde_json::to_vec(&tree).map_err(|err| encoding_error("json-encode", err))
}

/// Decodes a run report or JSON batch file.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, QfError> {
    serde_json::from_slice(data).map_err(|err| encoding_error("json-decode", err))
}

/// Encodes run parameters as YAML.
pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String, QfError> {
    serde_yaml::to_string(value).map_err(|err| encoding_error("yaml-encode", err))
}

/// Decodes run parameters from YAML.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, QfError> {
    serde_yaml::from_slice(data).map_err(|err| encoding_error("yaml-decode", err))
}

//! Backend-specific extension options.
//!
//! A backend may publish a JSON schema (the `properties` /
//! `additionalProperties` / `required` subset of JSON Schema) for extra
//! options. User-supplied extensions are checked against it before any job
//! is dispatched. String values are coerced into the declared scalar type so
//! that `key=value` command-line assignments work.

use serde_json::{Map, Value};

use crate::error::{BackendError, Result};

/// Parse `key=value` assignments into a JSON object of strings.
pub fn parse_extension_flags(assignments: &[String]) -> Result<Map<String, Value>> {
    let mut merged = Map::new();
    for assignment in assignments {
        let parts: Vec<&str> = assignment.split('=').collect();
        let [key, value] = parts.as_slice() else {
            return Err(invalid_flag(format!("Invalid extension assignment <{assignment}>")));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid_flag(format!("Invalid extension assignment <{assignment}>")));
        }
        if merged.contains_key(key) {
            return Err(invalid_flag(format!("Duplicate extension assignment <{assignment}>")));
        }
        merged.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(merged)
}

fn invalid_flag(detail: String) -> BackendError {
    BackendError::InvalidExtensions {
        backend: "<command line>".into(),
        detail,
    }
}

/// Check `extensions` against a backend's schema, returning the coerced value.
pub fn validate_extensions(
    backend: &str,
    schema: Option<&Value>,
    extensions: Option<&Value>,
) -> Result<Option<Value>> {
    let invalid = |detail: String| BackendError::InvalidExtensions {
        backend: backend.to_string(),
        detail,
    };

    let Some(extensions) = extensions else {
        return Ok(None);
    };
    let Some(schema) = schema else {
        return Err(invalid("backend does not accept extensions".into()));
    };
    let Some(given) = extensions.as_object() else {
        return Err(invalid("extensions must be a table of options".into()));
    };

    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let additional = schema
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let mut coerced = Map::new();
    for (key, value) in given {
        match properties.get(key) {
            Some(property) => {
                let value = coerce(property, value).ok_or_else(|| {
                    invalid(format!(
                        "option '{key}' expects {}, got {value}",
                        type_label(property)
                    ))
                })?;
                coerced.insert(key.clone(), value);
            }
            None if additional => {
                coerced.insert(key.clone(), value.clone());
            }
            None => {
                let mut known: Vec<&str> = properties.keys().map(String::as_str).collect();
                known.sort_unstable();
                return Err(invalid(format!(
                    "unknown option '{key}' (known options: {})",
                    known.join(", ")
                )));
            }
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !coerced.contains_key(name) {
                return Err(invalid(format!("missing required option '{name}'")));
            }
        }
    }

    Ok(Some(Value::Object(coerced)))
}

/// Declared types of a property (`type` string or list, or `anyOf` members).
fn declared_types(property: &Value) -> Vec<&str> {
    match property.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => property
            .get("anyOf")
            .and_then(Value::as_array)
            .map(|variants| variants.iter().flat_map(declared_types).collect())
            .unwrap_or_default(),
    }
}

/// Human-readable type of a property, as shown in extension listings.
pub fn type_label(property: &Value) -> String {
    let types = declared_types(property);
    if types.is_empty() {
        "any".into()
    } else {
        types.join(" | ")
    }
}

fn coerce(property: &Value, value: &Value) -> Option<Value> {
    let types = declared_types(property);
    if types.is_empty() {
        return Some(value.clone());
    }
    if types.iter().any(|t| matches_type(t, value)) {
        return Some(value.clone());
    }
    let Value::String(text) = value else {
        return None;
    };
    types.iter().find_map(|t| coerce_str(t, text))
}

fn matches_type(ty: &str, value: &Value) -> bool {
    match ty {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
    }
}

fn coerce_str(ty: &str, text: &str) -> Option<Value> {
    let text = text.trim();
    match ty {
        "integer" => text.parse::<i64>().ok().map(Value::from),
        "number" => text.parse::<f64>().ok().map(Value::from),
        "boolean" => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        "null" if text.eq_ignore_ascii_case("null") || text.eq_ignore_ascii_case("none") => {
            Some(Value::Null)
        }
        _ => None,
    }
}

//! Payload sanitization and field validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::error::SecurityError;
use super::policy::FieldRule;

static ANGLE_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[<>]").expect("valid regex"));
static JAVASCRIPT_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript:").expect("valid regex"));
static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)on\w+=").expect("valid regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid regex"));

/// Strip markup and script vectors from a string.
///
/// Removal runs to a fixed point: deleting one match can join its
/// neighbours into a new one (`javajavascript:script:`), and a single pass
/// would leave that for the next call to find.
pub fn sanitize_str(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = ANGLE_BRACKETS.replace_all(&current, "");
        let next = JAVASCRIPT_SCHEME.replace_all(&next, "");
        let next = EVENT_HANDLER.replace_all(&next, "");
        let next = next.trim().to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// `sanitize_str` for strings, identity for every other JSON value
pub fn sanitize_string(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        other => other.clone(),
    }
}

/// Trimmed, lower-cased email, or a validation error
pub fn validate_email(value: &Value) -> Result<String, SecurityError> {
    let raw = value
        .as_str()
        .ok_or_else(|| SecurityError::validation("Email must be a string"))?;
    let email = raw.trim();
    if !EMAIL.is_match(email) {
        return Err(SecurityError::validation("Invalid email format"));
    }
    Ok(email.to_lowercase())
}

/// Caller identity token: 1-128 chars of `[A-Za-z0-9_-]`
pub fn validate_identifier(value: &Value) -> Result<String, SecurityError> {
    match value.as_str() {
        Some(id) if IDENTIFIER.is_match(id) => Ok(id.to_string()),
        _ => Err(SecurityError::validation("Invalid user ID")),
    }
}

/// Sanitize every value of an object, applying the schema's validators
/// to the fields it names. Nested objects recurse with the same schema.
pub fn sanitize_object(
    object: &Map<String, Value>,
    schema: &BTreeMap<String, FieldRule>,
) -> Result<Map<String, Value>, SecurityError> {
    let mut sanitized = Map::with_capacity(object.len());

    for (key, value) in object {
        let clean = match (schema.get(key), value) {
            (Some(FieldRule::Email), v) => Value::String(validate_email(v).map_err(|e| with_field(e, key))?),
            (Some(FieldRule::Identifier), v) => {
                Value::String(validate_identifier(v).map_err(|e| with_field(e, key))?)
            }
            (None, Value::String(s)) => Value::String(sanitize_str(s)),
            (None, Value::Object(nested)) => Value::Object(sanitize_object(nested, schema)?),
            (None, Value::Array(items)) => Value::Array(items.iter().map(sanitize_string).collect()),
            (None, other) => other.clone(),
        };
        sanitized.insert(key.clone(), clean);
    }

    Ok(sanitized)
}

/// Fail once, naming every field that is absent or falsy
pub fn require_fields(object: &Map<String, Value>, fields: &[String]) -> Result<(), SecurityError> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|name| object.get(name.as_str()).map_or(true, is_falsy))
        .cloned()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(SecurityError::Validation {
        message: format!("Missing required fields: {}", missing.join(", ")),
        fields: missing,
    })
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn with_field(err: SecurityError, field: &str) -> SecurityError {
    match err {
        SecurityError::Validation { message, .. } => {
            SecurityError::invalid_field(field, format!("{}: {}", field, message))
        }
        other => other,
    }
}

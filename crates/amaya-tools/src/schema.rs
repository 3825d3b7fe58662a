//! Argument validation against a tool's JSON Schema.
//!
//! Covers the subset of JSON Schema tool declarations actually use:
//! `type` (single or list), `required`, `properties`,
//! `additionalProperties`, `enum`, `items`, `minItems`/`maxItems`,
//! `minimum`/`maximum` and `minLength`/`maxLength`. Unknown keywords are
//! ignored so server-provided MCP schemas never block a call outright.
//!
//! An optional property sent as `null` is treated as absent; models do
//! that a lot.

use serde_json::{Map, Value};
use std::fmt;

/// A schema violation, with the JSON path where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Validate `value` against `schema`, stopping at the first violation.
pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaError> {
    check(schema, value, "$")
}

fn check(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    // `true` and `{}` accept anything; `false` accepts nothing.
    let rules = match schema {
        Value::Object(rules) => rules,
        Value::Bool(false) => return Err(SchemaError::new(path, "no value is allowed here")),
        _ => return Ok(()),
    };

    if let Some(expected) = rules.get("type") {
        if !type_allows(expected, value) {
            return Err(SchemaError::new(
                path,
                format!("expected {}, got {}", describe_type(expected), type_name(value)),
            ));
        }
    }

    if let Some(Value::Array(options)) = rules.get("enum") {
        if !options.contains(value) {
            let allowed = options
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SchemaError::new(
                path,
                format!("must be one of [{}]", allowed),
            ));
        }
    }

    match value {
        Value::Object(map) => check_object(rules, map, path),
        Value::Array(items) => check_array(rules, items, path),
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(0.0);
            if let Some(min) = rules.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    return Err(SchemaError::new(path, format!("must be >= {}", min)));
                }
            }
            if let Some(max) = rules.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    return Err(SchemaError::new(path, format!("must be <= {}", max)));
                }
            }
            Ok(())
        }
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = rules.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    return Err(SchemaError::new(
                        path,
                        format!("must be at least {} characters", min),
                    ));
                }
            }
            if let Some(max) = rules.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    return Err(SchemaError::new(
                        path,
                        format!("must be at most {} characters", max),
                    ));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_object(
    rules: &Map<String, Value>,
    map: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaError> {
    let required: Vec<&str> = rules
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for name in &required {
        match map.get(*name) {
            None | Some(Value::Null) => {
                return Err(SchemaError::new(
                    path,
                    format!("missing required property '{}'", name),
                ))
            }
            Some(_) => {}
        }
    }

    let properties = rules.get("properties").and_then(Value::as_object);
    let additional = rules.get("additionalProperties");

    for (key, item) in map {
        let child = format!("{}.{}", path, key);
        if item.is_null() && !required.contains(&key.as_str()) {
            continue;
        }
        match properties.and_then(|p| p.get(key)) {
            Some(schema) => check(schema, item, &child)?,
            None => match additional {
                Some(Value::Bool(false)) => {
                    return Err(SchemaError::new(&child, "unexpected property"))
                }
                Some(schema @ Value::Object(_)) => check(schema, item, &child)?,
                _ => {}
            },
        }
    }
    Ok(())
}

fn check_array(
    rules: &Map<String, Value>,
    items: &[Value],
    path: &str,
) -> Result<(), SchemaError> {
    let len = items.len() as u64;
    if let Some(min) = rules.get("minItems").and_then(Value::as_u64) {
        if len < min {
            return Err(SchemaError::new(
                path,
                format!("must contain at least {} items", min),
            ));
        }
    }
    if let Some(max) = rules.get("maxItems").and_then(Value::as_u64) {
        if len > max {
            return Err(SchemaError::new(
                path,
                format!("must contain at most {} items", max),
            ));
        }
    }
    if let Some(schema) = rules.get("items") {
        for (i, item) in items.iter().enumerate() {
            check(schema, item, &format!("{}[{}]", path, i))?;
        }
    }
    Ok(())
}

fn type_allows(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| type_matches(name, value)),
        _ => true,
    }
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

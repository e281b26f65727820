//! Value validation against schemas

use crate::error::ValidationError;
use crate::schema::{is_integral_value, values_equal, ScalarKind, ScalarSchema, Schema, SchemaPath};
use serde_json::Value;

type Outcome = std::result::Result<(), ValidationError>;

/// Validate a concrete value against a schema
pub fn validate(value: &Value, schema: &Schema) -> Outcome {
    validate_at(value, schema, &SchemaPath::root())
}

/// Validate a value that sits at `path` inside a larger document
pub fn validate_at(value: &Value, schema: &Schema, path: &SchemaPath) -> Outcome {
    match schema {
        Schema::Any => Ok(()),
        Schema::Scalar(scalar) => validate_scalar(value, scalar, path),
        Schema::Object(object) => {
            let Value::Object(map) = value else {
                return Err(ValidationError::new(
                    path.clone(),
                    format!("expected object, got {}", describe(value)),
                ));
            };
            for (name, property) in &object.properties {
                match map.get(name) {
                    Some(v) => validate_at(v, property, &path.property(name))?,
                    None if object.required.contains(name) => {
                        return Err(ValidationError::new(
                            path.property(name),
                            "required property is missing",
                        ))
                    }
                    None => {}
                }
            }
            if !object.additional_properties {
                if let Some(extra) = map.keys().find(|k| !object.properties.contains_key(*k)) {
                    return Err(ValidationError::new(
                        path.property(extra),
                        "property is not permitted",
                    ));
                }
            }
            Ok(())
        }
        Schema::Array(array) => {
            let Value::Array(items) = value else {
                return Err(ValidationError::new(
                    path.clone(),
                    format!("expected array, got {}", describe(value)),
                ));
            };
            if let Some(min) = array.min_items {
                if items.len() < min {
                    return Err(ValidationError::new(
                        path.clone(),
                        format!("array has {} items, fewer than minItems {}", items.len(), min),
                    ));
                }
            }
            if let Some(max) = array.max_items {
                if items.len() > max {
                    return Err(ValidationError::new(
                        path.clone(),
                        format!("array has {} items, more than maxItems {}", items.len(), max),
                    ));
                }
            }
            items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| validate_at(item, &array.items, &path.index(i)))
        }
        Schema::AllOf(branches) => branches.iter().try_for_each(|b| validate_at(value, b, path)),
        Schema::AnyOf(branches) => {
            let mut errors = Vec::new();
            for branch in branches {
                match validate_at(value, branch, path) {
                    Ok(()) => return Ok(()),
                    Err(e) => errors.push(e),
                }
            }
            Err(closest(errors, path, value))
        }
        Schema::OneOf(branches) => {
            let mut errors = Vec::new();
            let mut matched = 0;
            for branch in branches {
                match validate_at(value, branch, path) {
                    Ok(()) => matched += 1,
                    Err(e) => errors.push(e),
                }
            }
            match matched {
                1 => Ok(()),
                0 => Err(closest(errors, path, value)),
                n => Err(ValidationError::new(
                    path.clone(),
                    format!("value matches {} alternatives of oneOf, expected exactly one", n),
                )),
            }
        }
    }
}

fn validate_scalar(value: &Value, scalar: &ScalarSchema, path: &SchemaPath) -> Outcome {
    let kind_ok = match scalar.kind {
        ScalarKind::Number => value.is_number(),
        ScalarKind::Integer => is_integral_value(value),
        ScalarKind::String => value.is_string(),
        ScalarKind::Boolean => value.is_boolean(),
        ScalarKind::Null => value.is_null(),
    };
    if !kind_ok {
        return Err(ValidationError::new(
            path.clone(),
            format!("expected {}, got {}", scalar.kind.as_str(), describe(value)),
        ));
    }

    if let Some(v) = value.as_f64() {
        if let Some(min) = scalar.minimum {
            if v < min.value || (min.exclusive && v == min.value) {
                let relation = if min.exclusive { "must be greater than" } else { "is below minimum" };
                return Err(ValidationError::new(
                    path.clone(),
                    format!("{} {} {}", value, relation, min.value),
                ));
            }
        }
        if let Some(max) = scalar.maximum {
            if v > max.value || (max.exclusive && v == max.value) {
                let relation = if max.exclusive { "must be less than" } else { "is above maximum" };
                return Err(ValidationError::new(
                    path.clone(),
                    format!("{} {} {}", value, relation, max.value),
                ));
            }
        }
    }

    if let Some(members) = &scalar.enumeration {
        if !members.iter().any(|m| values_equal(m, value)) {
            return Err(ValidationError::new(
                path.clone(),
                format!("{} is not one of {}", value, Value::Array(members.clone())),
            ));
        }
    }
    Ok(())
}

/// Pick the branch error that got furthest into the value
fn closest(errors: Vec<ValidationError>, path: &SchemaPath, value: &Value) -> ValidationError {
    let count = errors.len();
    let deepest = errors
        .into_iter()
        .enumerate()
        .max_by_key(|(i, e)| (e.path.len(), std::cmp::Reverse(*i)))
        .map(|(_, e)| e);
    match deepest {
        Some(e) if e.path.len() > path.len() || count == 1 => e,
        _ => ValidationError::new(
            path.clone(),
            format!("{} matches none of {} alternatives", describe(value), count),
        ),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string \"{}\"", s),
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Object(_) => "object".to_string(),
    }
}

//! Structural subsumption between schemas
//!
//! `A ⊆ B` holds when every value valid under `A` is valid under `B`. Unions on
//! the producer side are quantified universally, unions on the consumer side
//! existentially; the producer rule is applied first so that `anyOf ⊆ anyOf`
//! means "every left branch fits some right branch". `allOf` is an intersection.

use super::validate::validate;
use crate::error::{ComposeError, Result};
use crate::schema::{ArraySchema, Bound, ObjectSchema, ScalarKind, ScalarSchema, Schema, SchemaPath};
use serde_json::{json, Value};

/// Largest integer range enumerated when the consumer only accepts an enum
const MAX_ENUMERATED_RANGE: i64 = 1024;

/// Whether every value satisfying `a` also satisfies `b`
pub fn is_subsumed_by(a: &Schema, b: &Schema) -> bool {
    check_subsumption(a, b).is_ok()
}

/// Like [`is_subsumed_by`], returning the first mismatch as a
/// [`ComposeError::TypeMismatch`] naming the path and the local schemas
pub fn check_subsumption(a: &Schema, b: &Schema) -> Result<()> {
    check(a, b, &SchemaPath::root())
}

fn check(a: &Schema, b: &Schema, path: &SchemaPath) -> Result<()> {
    if b.is_any() {
        return Ok(());
    }

    // Producer-side unions: every branch must fit
    if let Schema::AnyOf(branches) | Schema::OneOf(branches) = a {
        return branches.iter().try_for_each(|branch| check(branch, b, path));
    }

    // Consumer-side intersection: must fit every branch
    if let Schema::AllOf(branches) = b {
        return branches.iter().try_for_each(|branch| check(a, branch, path));
    }

    // Producer-side intersection: one branch suffices, else the merged intersection
    if let Schema::AllOf(branches) = a {
        let mut first_error = None;
        for branch in branches {
            match check(branch, b, path) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(merged) = branches.split_first().and_then(|(first, rest)| {
            rest.iter().try_fold(first.clone(), |acc, s| acc.intersect(s))
        }) {
            if check(&merged, b, path).is_ok() {
                return Ok(());
            }
        }
        return Err(first_error
            .unwrap_or_else(|| ComposeError::mismatch(path, "empty intersection", a, b)));
    }

    // Consumer-side unions: some branch must fit
    if let Schema::AnyOf(branches) | Schema::OneOf(branches) = b {
        let mut errors = Vec::with_capacity(branches.len());
        for branch in branches {
            match check(a, branch, path) {
                Ok(()) => return Ok(()),
                Err(e) => errors.push(e),
            }
        }
        return Err(closest(errors, path, a, b));
    }

    match (a, b) {
        (Schema::Scalar(x), Schema::Scalar(y)) => check_scalars(x, y, a, b, path),
        (Schema::Object(x), Schema::Object(y)) => check_objects(x, y, a, b, path),
        (Schema::Array(x), Schema::Array(y)) => check_arrays(x, y, path),
        (Schema::Any, _) => Err(ComposeError::mismatch(
            path,
            "unconstrained producer is not accepted by a constrained consumer",
            a,
            b,
        )),
        _ => Err(ComposeError::mismatch(
            path,
            format!("{} is incompatible with {}", a.kind_name(), b.kind_name()),
            a,
            b,
        )),
    }
}

fn check_scalars(x: &ScalarSchema, y: &ScalarSchema, a: &Schema, b: &Schema, path: &SchemaPath) -> Result<()> {
    // An enumerated producer is exactly its (self-consistent) members
    if let Some(members) = x.effective_enum() {
        for member in members {
            if let Err(e) = validate(member, b) {
                return Err(ComposeError::mismatch(
                    path,
                    format!("enum member {} is not accepted: {}", member, e.reason),
                    a,
                    b,
                ));
            }
        }
        return Ok(());
    }

    let kinds_fit = match (x.kind, y.kind) {
        (p, c) if p == c => true,
        (ScalarKind::Integer, ScalarKind::Number) => true,
        _ => false,
    };
    if !kinds_fit {
        return Err(ComposeError::mismatch(
            path,
            format!("{} is incompatible with {}", x.kind.as_str(), y.kind.as_str()),
            a,
            b,
        ));
    }

    if y.enumeration.is_some() {
        return match finite_domain(x) {
            Some(values) => {
                for value in values {
                    if let Err(e) = validate(&value, b) {
                        return Err(ComposeError::mismatch(
                            path,
                            format!("value {} is not accepted: {}", value, e.reason),
                            a,
                            b,
                        ));
                    }
                }
                Ok(())
            }
            None => Err(ComposeError::mismatch(
                path,
                "consumer accepts only an enumeration but producer's domain is open",
                a,
                b,
            )),
        };
    }

    let (low, high) = producer_range(x);
    if !lower_contained(low, y.minimum) {
        return Err(ComposeError::mismatch(
            path,
            format!(
                "producer lower bound {} is outside consumer lower bound {}",
                describe_bound(low),
                describe_bound(y.minimum)
            ),
            a,
            b,
        ));
    }
    if !upper_contained(high, y.maximum) {
        return Err(ComposeError::mismatch(
            path,
            format!(
                "producer upper bound {} is outside consumer upper bound {}",
                describe_bound(high),
                describe_bound(y.maximum)
            ),
            a,
            b,
        ));
    }
    Ok(())
}

/// Producer range with integer bounds tightened to the nearest integers
fn producer_range(x: &ScalarSchema) -> (Option<Bound>, Option<Bound>) {
    if x.kind != ScalarKind::Integer {
        return (x.minimum, x.maximum);
    }
    let low = x.minimum.map(|b| {
        let v = if b.exclusive { b.value.floor() + 1.0 } else { b.value.ceil() };
        Bound::inclusive(v)
    });
    let high = x.maximum.map(|b| {
        let v = if b.exclusive { b.value.ceil() - 1.0 } else { b.value.floor() };
        Bound::inclusive(v)
    });
    (low, high)
}

fn lower_contained(producer: Option<Bound>, consumer: Option<Bound>) -> bool {
    match (producer, consumer) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(p), Some(c)) => {
            p.value > c.value || (p.value == c.value && (p.exclusive || !c.exclusive))
        }
    }
}

fn upper_contained(producer: Option<Bound>, consumer: Option<Bound>) -> bool {
    match (producer, consumer) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(p), Some(c)) => {
            p.value < c.value || (p.value == c.value && (p.exclusive || !c.exclusive))
        }
    }
}

fn describe_bound(bound: Option<Bound>) -> String {
    match bound {
        None => "unbounded".to_string(),
        Some(b) if b.exclusive => format!("{} (exclusive)", b.value),
        Some(b) => b.value.to_string(),
    }
}

/// Every value of a scalar domain, when it is small enough to list
fn finite_domain(x: &ScalarSchema) -> Option<Vec<Value>> {
    match x.kind {
        ScalarKind::Boolean => Some(vec![json!(false), json!(true)]),
        ScalarKind::Null => Some(vec![Value::Null]),
        ScalarKind::Integer => {
            let (low, high) = producer_range(x);
            let (low, high) = (low?.value as i64, high?.value as i64);
            if high < low {
                return Some(Vec::new());
            }
            if high - low >= MAX_ENUMERATED_RANGE {
                return None;
            }
            Some((low..=high).map(|v| json!(v)).collect())
        }
        ScalarKind::Number | ScalarKind::String => None,
    }
}

fn check_objects(x: &ObjectSchema, y: &ObjectSchema, a: &Schema, b: &Schema, path: &SchemaPath) -> Result<()> {
    for (name, consumer) in &y.properties {
        let property_path = path.property(name);
        match x.properties.get(name) {
            Some(producer) => check(producer, consumer, &property_path)?,
            None if y.required.contains(name) => {
                return Err(ComposeError::mismatch(
                    &property_path,
                    "property required by consumer is missing from producer",
                    a,
                    b,
                ))
            }
            None => {}
        }
    }
    if !y.additional_properties {
        if let Some((name, producer)) = x.properties.iter().find(|(n, _)| !y.properties.contains_key(*n)) {
            return Err(ComposeError::mismatch(
                &path.property(name),
                "property is not permitted by consumer",
                producer,
                b,
            ));
        }
        if x.additional_properties {
            return Err(ComposeError::mismatch(
                path,
                "producer admits additional properties but consumer is closed",
                a,
                b,
            ));
        }
    }
    Ok(())
}

fn check_arrays(x: &ArraySchema, y: &ArraySchema, path: &SchemaPath) -> Result<()> {
    let producer_min = x.min_items.unwrap_or(0);
    let consumer_min = y.min_items.unwrap_or(0);
    let length_fits = producer_min >= consumer_min
        && match (x.max_items, y.max_items) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(p), Some(c)) => p <= c,
        };
    if !length_fits {
        return Err(ComposeError::mismatch(
            path,
            format!(
                "producer length {}..{} is outside consumer length {}..{}",
                producer_min,
                x.max_items.map_or("∞".to_string(), |m| m.to_string()),
                consumer_min,
                y.max_items.map_or("∞".to_string(), |m| m.to_string()),
            ),
            &Schema::Array(x.clone()),
            &Schema::Array(y.clone()),
        ));
    }
    check(&x.items, &y.items, &path.items())
}

/// Prefer the branch failure that got furthest into the structure
fn closest(errors: Vec<ComposeError>, path: &SchemaPath, a: &Schema, b: &Schema) -> ComposeError {
    let depth = |e: &ComposeError| e.path().map_or(0, |p| p.len());
    let count = errors.len();
    let mut deepest: Option<ComposeError> = None;
    for error in errors {
        if deepest.as_ref().map_or(true, |d| depth(&error) > depth(d)) {
            deepest = Some(error);
        }
    }
    match deepest {
        Some(e) if depth(&e) > path.len() || count == 1 => e,
        _ => ComposeError::mismatch(
            path,
            format!("producer fits none of the consumer's {} alternatives", count),
            a,
            b,
        ),
    }
}

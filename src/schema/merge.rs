//! Schema intersection and union

use super::{values_equal, ArraySchema, Bound, Distribution, ObjectSchema, ScalarKind, ScalarSchema, Schema};
use crate::checker::is_subsumed_by;

pub(super) fn intersect(a: &Schema, b: &Schema) -> Option<Schema> {
    match (a, b) {
        (Schema::Any, other) | (other, Schema::Any) => Some(other.clone()),
        (Schema::AllOf(branches), other) | (other, Schema::AllOf(branches)) => {
            let merged = merge_all(branches)?;
            intersect(&merged, other)
        }
        (Schema::Scalar(x), Schema::Scalar(y)) => intersect_scalars(x, y).map(Schema::Scalar),
        (Schema::Object(x), Schema::Object(y)) => intersect_objects(x, y).map(Schema::Object),
        (Schema::Array(x), Schema::Array(y)) => {
            let items = intersect(&x.items, &y.items)?;
            Some(Schema::Array(ArraySchema {
                items: Box::new(items),
                min_items: max_option(x.min_items, y.min_items),
                max_items: min_option(x.max_items, y.max_items),
            }))
        }
        _ => None,
    }
}

/// Fold an `allOf` into one schema
pub(super) fn merge_all(branches: &[Schema]) -> Option<Schema> {
    let (first, rest) = branches.split_first()?;
    rest.iter()
        .try_fold(first.clone(), |acc, branch| intersect(&acc, branch))
}

fn intersect_scalars(x: &ScalarSchema, y: &ScalarSchema) -> Option<ScalarSchema> {
    let kind = match (x.kind, y.kind) {
        (a, b) if a == b => a,
        (ScalarKind::Integer, ScalarKind::Number) | (ScalarKind::Number, ScalarKind::Integer) => {
            ScalarKind::Integer
        }
        _ => return None,
    };
    let enumeration = match (&x.enumeration, &y.enumeration) {
        (Some(xs), Some(ys)) => Some(
            xs.iter()
                .filter(|v| ys.iter().any(|w| values_equal(v, w)))
                .cloned()
                .collect::<Vec<_>>(),
        ),
        (Some(values), None) | (None, Some(values)) => Some(values.clone()),
        (None, None) => None,
    };
    if enumeration.as_ref().map_or(false, |values| values.is_empty()) {
        return None;
    }
    let distribution = if x.distribution == Distribution::LogUniform || y.distribution == Distribution::LogUniform {
        Distribution::LogUniform
    } else {
        Distribution::Uniform
    };
    Some(ScalarSchema {
        kind,
        minimum: tighter_lower(x.minimum, y.minimum),
        maximum: tighter_upper(x.maximum, y.maximum),
        enumeration,
        distribution,
        minimum_for_optimizer: max_f64(x.minimum_for_optimizer, y.minimum_for_optimizer),
        maximum_for_optimizer: min_f64(x.maximum_for_optimizer, y.maximum_for_optimizer),
    })
}

fn intersect_objects(x: &ObjectSchema, y: &ObjectSchema) -> Option<ObjectSchema> {
    let mut merged = x.clone();
    for (name, schema) in &y.properties {
        let property = match x.properties.get(name) {
            Some(existing) => intersect(existing, schema)?,
            // a closed side forbids what it does not declare
            None if !x.additional_properties => {
                if y.required.contains(name) {
                    return None;
                }
                continue;
            }
            None => schema.clone(),
        };
        merged.properties.insert(name.clone(), property);
    }
    if !y.additional_properties {
        for name in x.properties.keys().filter(|n| !y.properties.contains_key(*n)) {
            if x.required.contains(name) {
                return None;
            }
            merged.properties.remove(name);
            merged.defaults.remove(name);
        }
    }
    merged.required.extend(y.required.iter().cloned());
    merged.additional_properties = x.additional_properties && y.additional_properties;
    merged.relevant_to_optimizer = match (&x.relevant_to_optimizer, &y.relevant_to_optimizer) {
        (Some(a), Some(b)) => Some(a.union(b).cloned().collect()),
        (Some(a), None) | (None, Some(a)) => Some(a.clone()),
        (None, None) => None,
    };
    for (name, value) in &y.defaults {
        if merged.additional_properties || merged.properties.contains_key(name) {
            merged.defaults.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }
    Some(merged)
}

pub(super) fn union_of(schemas: Vec<Schema>) -> Schema {
    let mut flat = Vec::new();
    for schema in schemas {
        match schema {
            Schema::AnyOf(branches) => flat.extend(branches),
            other => flat.push(other),
        }
    }
    let mut kept: Vec<Schema> = Vec::new();
    for schema in flat {
        if kept.iter().any(|k| is_subsumed_by(&schema, k)) {
            continue;
        }
        // replace every kept member the new one covers, at the first such slot
        let mut slot = None;
        let mut i = 0;
        while i < kept.len() {
            if is_subsumed_by(&kept[i], &schema) {
                kept.remove(i);
                slot.get_or_insert(i);
            } else {
                i += 1;
            }
        }
        match slot {
            Some(i) => kept.insert(i, schema),
            None => kept.push(schema),
        }
    }
    if kept.len() == 1 {
        kept.remove(0)
    } else {
        Schema::AnyOf(kept)
    }
}

pub(super) fn domain_part(schema: &Schema) -> Schema {
    match schema {
        Schema::Any | Schema::Scalar(_) => schema.clone(),
        Schema::Object(object) => {
            let mut object = object.clone();
            for property in object.properties.values_mut() {
                *property = domain_part(property);
            }
            Schema::Object(object)
        }
        Schema::Array(array) => Schema::Array(ArraySchema {
            items: Box::new(domain_part(&array.items)),
            ..array.clone()
        }),
        Schema::AnyOf(branches) => Schema::AnyOf(branches.iter().map(domain_part).collect()),
        Schema::OneOf(branches) => Schema::OneOf(branches.iter().map(domain_part).collect()),
        Schema::AllOf(branches) => match merge_all(branches) {
            Some(merged) => domain_part(&merged),
            None => branches.first().map(domain_part).unwrap_or(Schema::Any),
        },
    }
}

pub(super) fn has_constraints(schema: &Schema) -> bool {
    match schema {
        Schema::Any | Schema::Scalar(_) => false,
        Schema::Object(object) => object.properties.values().any(has_constraints),
        Schema::Array(array) => has_constraints(&array.items),
        Schema::AnyOf(branches) | Schema::OneOf(branches) => branches.iter().any(has_constraints),
        Schema::AllOf(branches) => match merge_all(branches) {
            Some(merged) => has_constraints(&merged),
            None => true,
        },
    }
}

fn tighter_lower(a: Option<Bound>, b: Option<Bound>) -> Option<Bound> {
    match (a, b) {
        (Some(x), Some(y)) => {
            if x.value > y.value || (x.value == y.value && x.exclusive) {
                Some(x)
            } else {
                Some(y)
            }
        }
        (x, None) => x,
        (None, y) => y,
    }
}

fn tighter_upper(a: Option<Bound>, b: Option<Bound>) -> Option<Bound> {
    match (a, b) {
        (Some(x), Some(y)) => {
            if x.value < y.value || (x.value == y.value && x.exclusive) {
                Some(x)
            } else {
                Some(y)
            }
        }
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_option(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn min_option(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_f64(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn min_f64(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

//! Disjointness between schemas

use super::validate::validate;
use crate::schema::{ArraySchema, Bound, ObjectSchema, ScalarSchema, Schema};

/// Whether no value can satisfy both schemas.
///
/// Conservative: `false` only means an overlap could not be ruled out.
pub fn are_disjoint(a: &Schema, b: &Schema) -> bool {
    match (a, b) {
        (Schema::Any, _) | (_, Schema::Any) => false,
        (Schema::AnyOf(branches), other)
        | (Schema::OneOf(branches), other)
        | (other, Schema::AnyOf(branches))
        | (other, Schema::OneOf(branches)) => branches.iter().all(|branch| are_disjoint(branch, other)),
        (Schema::AllOf(branches), other) | (other, Schema::AllOf(branches)) => {
            branches.iter().any(|branch| are_disjoint(branch, other))
        }
        (Schema::Scalar(x), Schema::Scalar(y)) => scalars_disjoint(x, y),
        (Schema::Object(x), Schema::Object(y)) => objects_disjoint(x, y) || objects_disjoint(y, x),
        (Schema::Array(x), Schema::Array(y)) => arrays_disjoint(x, y),
        // different JSON kinds
        _ => true,
    }
}

fn scalars_disjoint(x: &ScalarSchema, y: &ScalarSchema) -> bool {
    let compatible = x.kind == y.kind || (x.kind.is_numeric() && y.kind.is_numeric());
    if !compatible {
        return true;
    }
    if let Some(members) = x.effective_enum() {
        let other = Schema::Scalar(y.clone());
        return members.iter().all(|member| validate(member, &other).is_err());
    }
    if let Some(members) = y.effective_enum() {
        let other = Schema::Scalar(x.clone());
        return members.iter().all(|member| validate(member, &other).is_err());
    }
    x.kind.is_numeric() && (below(x.maximum, y.minimum) || below(y.maximum, x.minimum))
}

/// Whether every value under `upper` lies below every value above `lower`
fn below(upper: Option<Bound>, lower: Option<Bound>) -> bool {
    match (upper, lower) {
        (Some(u), Some(l)) => u.value < l.value || (u.value == l.value && (u.exclusive || l.exclusive)),
        _ => false,
    }
}

/// A property `x` requires that `y` forbids or types incompatibly
fn objects_disjoint(x: &ObjectSchema, y: &ObjectSchema) -> bool {
    x.required.iter().any(|name| match (x.properties.get(name), y.properties.get(name)) {
        (_, None) => !y.additional_properties,
        (Some(px), Some(py)) => are_disjoint(px, py),
        (None, Some(_)) => false,
    })
}

fn arrays_disjoint(x: &ArraySchema, y: &ArraySchema) -> bool {
    let shorter = |max: Option<usize>, min: Option<usize>| matches!((max, min), (Some(h), Some(l)) if h < l);
    if shorter(x.max_items, y.min_items) || shorter(y.max_items, x.min_items) {
        return true;
    }
    let nonempty = x.min_items.unwrap_or(0).max(y.min_items.unwrap_or(0)) >= 1;
    nonempty && are_disjoint(&x.items, &y.items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_disjointness() {
        assert!(are_disjoint(&Schema::integer_range(1, 3), &Schema::integer_range(4, 9)));
        assert!(!are_disjoint(&Schema::integer_range(1, 4), &Schema::number_range(4.0, 9.0)));
        assert!(are_disjoint(&Schema::boolean(), &Schema::number()));
        assert!(!are_disjoint(&Schema::string(), &Schema::string()));

        let low = Schema::scalar(ScalarSchema::new(crate::schema::ScalarKind::Number).with_exclusive_maximum(1.0));
        assert!(are_disjoint(&low, &Schema::number_range(1.0, 2.0)));
    }

    #[test]
    fn test_enum_disjointness() {
        let a = Schema::enumeration(vec![json!(1), json!(2)]);
        let b = Schema::enumeration(vec![json!(2), json!(3)]);
        let c = Schema::enumeration(vec![json!(3), json!(4)]);
        assert!(!are_disjoint(&a, &b));
        assert!(are_disjoint(&a, &c));
        assert!(are_disjoint(&a, &Schema::integer_range(5, 10)));
    }

    #[test]
    fn test_object_disjointness() {
        let knn = Schema::object(ObjectSchema::new().required("KNN", Schema::Any).closed());
        let lr = Schema::object(ObjectSchema::new().required("LR", Schema::Any).closed());
        assert!(are_disjoint(&knn, &lr));

        // open objects may carry both keys
        let knn_open = Schema::object(ObjectSchema::new().required("KNN", Schema::Any));
        let lr_open = Schema::object(ObjectSchema::new().required("LR", Schema::Any));
        assert!(!are_disjoint(&knn_open, &lr_open));

        let small = Schema::object(ObjectSchema::new().required("k", Schema::integer_range(1, 5)));
        let large = Schema::object(ObjectSchema::new().optional("k", Schema::integer_range(10, 20)));
        assert!(are_disjoint(&small, &large));
        assert!(are_disjoint(&small, &Schema::array_of(Schema::number())));
    }

    #[test]
    fn test_union_disjointness() {
        let union = Schema::any_of(vec![Schema::integer_range(1, 2), Schema::null()]);
        assert!(are_disjoint(&union, &Schema::integer_range(3, 4)));
        assert!(!are_disjoint(&union, &Schema::null()));
        assert!(!are_disjoint(&Schema::Any, &Schema::null()));
    }
}

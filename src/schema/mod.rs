//! Structural schemas
//!
//! A [`Schema`] describes a set of JSON-like values: scalars with ranges and enums,
//! objects with named properties, arrays, and `anyOf`/`allOf`/`oneOf` unions.
//! Schemas are immutable values; every consumer matches the variants exhaustively.
//!
//! Schemas normally arrive from an operator adapter as JSON documents, see
//! [`Schema::from_json`].

mod json;
mod merge;
mod path;

pub use path::{PathSegment, SchemaPath};

use crate::checker;
use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of a scalar value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Number,
    Integer,
    String,
    Boolean,
    Null,
}

impl ScalarKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarKind::Number | ScalarKind::Integer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::Number => "number",
            ScalarKind::Integer => "integer",
            ScalarKind::String => "string",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Null => "null",
        }
    }

    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name {
            "number" => Some(ScalarKind::Number),
            "integer" => Some(ScalarKind::Integer),
            "string" => Some(ScalarKind::String),
            "boolean" => Some(ScalarKind::Boolean),
            "null" => Some(ScalarKind::Null),
            _ => None,
        }
    }

    /// Kind of a concrete scalar value; integral numbers report `Integer`
    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(ScalarKind::Null),
            Value::Bool(_) => Some(ScalarKind::Boolean),
            Value::String(_) => Some(ScalarKind::String),
            Value::Number(n) => {
                if is_integral(n) {
                    Some(ScalarKind::Integer)
                } else {
                    Some(ScalarKind::Number)
                }
            }
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Sampling hint for numeric ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distribution {
    #[default]
    Uniform,
    LogUniform,
}

/// One end of a numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: f64,
    pub exclusive: bool,
}

impl Bound {
    pub fn inclusive(value: f64) -> Self {
        Self {
            value,
            exclusive: false,
        }
    }

    pub fn exclusive(value: f64) -> Self {
        Self {
            value,
            exclusive: true,
        }
    }
}

/// Scalar schema: a kind plus optional range, enum and optimizer hints
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarSchema {
    pub kind: ScalarKind,
    pub minimum: Option<Bound>,
    pub maximum: Option<Bound>,
    pub enumeration: Option<Vec<Value>>,
    pub distribution: Distribution,
    /// Narrower lower end used only when sampling
    pub minimum_for_optimizer: Option<f64>,
    /// Narrower upper end used only when sampling
    pub maximum_for_optimizer: Option<f64>,
}

impl ScalarSchema {
    pub fn new(kind: ScalarKind) -> Self {
        Self {
            kind,
            minimum: None,
            maximum: None,
            enumeration: None,
            distribution: Distribution::Uniform,
            minimum_for_optimizer: None,
            maximum_for_optimizer: None,
        }
    }

    pub fn with_minimum(mut self, value: f64) -> Self {
        self.minimum = Some(Bound::inclusive(value));
        self
    }

    pub fn with_maximum(mut self, value: f64) -> Self {
        self.maximum = Some(Bound::inclusive(value));
        self
    }

    pub fn with_exclusive_minimum(mut self, value: f64) -> Self {
        self.minimum = Some(Bound::exclusive(value));
        self
    }

    pub fn with_exclusive_maximum(mut self, value: f64) -> Self {
        self.maximum = Some(Bound::exclusive(value));
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enumeration = Some(values);
        self
    }

    /// Mark the range as log-scaled for sampling
    pub fn log_uniform(mut self) -> Self {
        self.distribution = Distribution::LogUniform;
        self
    }

    pub fn with_optimizer_range(mut self, low: f64, high: f64) -> Self {
        self.minimum_for_optimizer = Some(low);
        self.maximum_for_optimizer = Some(high);
        self
    }

    /// Enum members that also satisfy this scalar's own kind and range
    pub fn effective_enum(&self) -> Option<Vec<&Value>> {
        let bare = ScalarSchema {
            enumeration: None,
            ..self.clone()
        };
        let bare = Schema::Scalar(bare);
        self.enumeration.as_ref().map(|values| {
            values
                .iter()
                .filter(|v| checker::validate(v, &bare).is_ok())
                .collect()
        })
    }
}

/// Object schema with named properties
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    pub properties: BTreeMap<String, Schema>,
    pub required: BTreeSet<String>,
    /// Whether properties not listed in `properties` may appear
    pub additional_properties: bool,
    /// Properties an optimizer should tune; `None` means all of them
    pub relevant_to_optimizer: Option<BTreeSet<String>>,
    /// Default values for properties
    pub defaults: BTreeMap<String, Value>,
}

impl ObjectSchema {
    /// Open object with no properties
    pub fn new() -> Self {
        Self {
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
            additional_properties: true,
            relevant_to_optimizer: None,
            defaults: BTreeMap::new(),
        }
    }

    /// Add a required property
    pub fn required(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        self.required.insert(name.clone());
        self.properties.insert(name, schema);
        self
    }

    /// Add an optional property
    pub fn optional(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Forbid properties beyond the declared ones
    pub fn closed(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(name.into(), value);
        self
    }

    pub fn with_relevant<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relevant_to_optimizer = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the optimizer should tune `name`
    pub fn is_relevant(&self, name: &str) -> bool {
        match &self.relevant_to_optimizer {
            Some(relevant) => relevant.contains(name),
            None => true,
        }
    }
}

impl Default for ObjectSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Array schema
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub items: Box<Schema>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

impl ArraySchema {
    pub fn new(items: Schema) -> Self {
        Self {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self
    }
}

/// Structural type of JSON-like values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Schema {
    /// Accepts every value
    Any,
    Scalar(ScalarSchema),
    Object(ObjectSchema),
    Array(ArraySchema),
    /// At least one branch
    AnyOf(Vec<Schema>),
    /// Every branch
    AllOf(Vec<Schema>),
    /// Exactly one branch
    OneOf(Vec<Schema>),
}

impl Schema {
    pub fn scalar(scalar: ScalarSchema) -> Self {
        Schema::Scalar(scalar)
    }

    pub fn number() -> Self {
        Schema::Scalar(ScalarSchema::new(ScalarKind::Number))
    }

    pub fn integer() -> Self {
        Schema::Scalar(ScalarSchema::new(ScalarKind::Integer))
    }

    pub fn string() -> Self {
        Schema::Scalar(ScalarSchema::new(ScalarKind::String))
    }

    pub fn boolean() -> Self {
        Schema::Scalar(ScalarSchema::new(ScalarKind::Boolean))
    }

    pub fn null() -> Self {
        Schema::Scalar(ScalarSchema::new(ScalarKind::Null))
    }

    /// Number in `[low, high]`
    pub fn number_range(low: f64, high: f64) -> Self {
        Schema::Scalar(
            ScalarSchema::new(ScalarKind::Number)
                .with_minimum(low)
                .with_maximum(high),
        )
    }

    /// Integer in `[low, high]`
    pub fn integer_range(low: i64, high: i64) -> Self {
        Schema::Scalar(
            ScalarSchema::new(ScalarKind::Integer)
                .with_minimum(low as f64)
                .with_maximum(high as f64),
        )
    }

    /// Enum of literal values; the kind is inferred and mixed kinds become `anyOf`
    pub fn enumeration(values: Vec<Value>) -> Self {
        let mut groups: Vec<(ScalarKind, Vec<Value>)> = Vec::new();
        for value in values {
            let kind = ScalarKind::of_value(&value).unwrap_or(ScalarKind::String);
            match groups.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, members)) => members.push(value),
                None => groups.push((kind, vec![value])),
            }
        }
        // integral and fractional numbers share one number enum
        let has_number = groups.iter().any(|(k, _)| *k == ScalarKind::Number);
        if has_number {
            if let Some(pos) = groups.iter().position(|(k, _)| *k == ScalarKind::Integer) {
                let (_, ints) = groups.remove(pos);
                if let Some((_, numbers)) = groups.iter_mut().find(|(k, _)| *k == ScalarKind::Number) {
                    numbers.extend(ints);
                }
            }
        }
        let mut branches: Vec<Schema> = groups
            .into_iter()
            .map(|(kind, members)| Schema::Scalar(ScalarSchema::new(kind).with_enum(members)))
            .collect();
        if branches.len() == 1 {
            branches.remove(0)
        } else {
            Schema::AnyOf(branches)
        }
    }

    pub fn object(object: ObjectSchema) -> Self {
        Schema::Object(object)
    }

    pub fn array_of(items: Schema) -> Self {
        Schema::Array(ArraySchema::new(items))
    }

    pub fn any_of(branches: Vec<Schema>) -> Self {
        Schema::AnyOf(branches)
    }

    pub fn all_of(branches: Vec<Schema>) -> Self {
        Schema::AllOf(branches)
    }

    pub fn one_of(branches: Vec<Schema>) -> Self {
        Schema::OneOf(branches)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Schema::Any)
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Schema::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Short name of the variant, for messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Schema::Any => "any",
            Schema::Scalar(s) => s.kind.as_str(),
            Schema::Object(_) => "object",
            Schema::Array(_) => "array",
            Schema::AnyOf(_) => "anyOf",
            Schema::AllOf(_) => "allOf",
            Schema::OneOf(_) => "oneOf",
        }
    }

    /// Check the schema's own structural invariants.
    ///
    /// Rejects `required`/`relevantToOptimizer`/default names absent from
    /// `properties`, defaults that violate their property schema, inverted ranges,
    /// bounds or enums on the wrong kind, log scaling over non-positive ranges and
    /// empty unions.
    pub fn check_well_formed(&self) -> Result<()> {
        self.check_at(&SchemaPath::root())
    }

    fn check_at(&self, path: &SchemaPath) -> Result<()> {
        match self {
            Schema::Any => Ok(()),
            Schema::Scalar(scalar) => check_scalar(scalar, path),
            Schema::Object(object) => {
                for name in &object.required {
                    if !object.properties.contains_key(name) {
                        return Err(ComposeError::malformed(
                            path,
                            format!("required property '{}' is not declared in properties", name),
                        ));
                    }
                }
                if let Some(relevant) = &object.relevant_to_optimizer {
                    if let Some(name) = relevant.iter().find(|n| !object.properties.contains_key(*n)) {
                        return Err(ComposeError::malformed(
                            path,
                            format!("relevantToOptimizer names undeclared property '{}'", name),
                        ));
                    }
                }
                for (name, schema) in &object.properties {
                    schema.check_at(&path.property(name))?;
                }
                for (name, value) in &object.defaults {
                    let Some(schema) = object.properties.get(name) else {
                        return Err(ComposeError::malformed(
                            path,
                            format!("default given for undeclared property '{}'", name),
                        ));
                    };
                    if let Err(e) = checker::validate(value, schema) {
                        return Err(ComposeError::malformed(
                            &path.property(name),
                            format!("default {} does not satisfy its schema: {}", value, e.reason),
                        ));
                    }
                }
                Ok(())
            }
            Schema::Array(array) => {
                if let (Some(min), Some(max)) = (array.min_items, array.max_items) {
                    if min > max {
                        return Err(ComposeError::malformed(
                            path,
                            format!("minItems {} exceeds maxItems {}", min, max),
                        ));
                    }
                }
                array.items.check_at(&path.items())
            }
            Schema::AnyOf(branches) | Schema::AllOf(branches) | Schema::OneOf(branches) => {
                if branches.is_empty() {
                    return Err(ComposeError::malformed(
                        path,
                        format!("{} must have at least one branch", self.kind_name()),
                    ));
                }
                branches.iter().try_for_each(|b| b.check_at(path))
            }
        }
    }

    /// Intersection of two schemas when it can be expressed without `allOf`
    pub fn intersect(&self, other: &Schema) -> Option<Schema> {
        merge::intersect(self, other)
    }

    /// Union of schemas with members subsumed by another member dropped
    pub fn union_of(schemas: Vec<Schema>) -> Schema {
        merge::union_of(schemas)
    }

    /// Reduce every `allOf` to its merged intersection, or to its first branch when
    /// the branches cannot be merged. The result describes the tunable domain;
    /// the dropped branches act as cross-parameter constraints.
    pub fn domain_part(&self) -> Schema {
        merge::domain_part(self)
    }

    /// Whether any `allOf` in the tree could not be fully merged
    pub fn has_constraints(&self) -> bool {
        merge::has_constraints(self)
    }

    /// Parse a JSON-Schema-dialect document
    pub fn from_json(value: &Value) -> Result<Schema> {
        json::from_json(value)
    }

    /// Render as a JSON-Schema-dialect document
    pub fn to_json(&self) -> Value {
        json::to_json(self)
    }
}

fn check_scalar(scalar: &ScalarSchema, path: &SchemaPath) -> Result<()> {
    let numeric = scalar.kind.is_numeric();
    for bound in [scalar.minimum, scalar.maximum].iter().flatten() {
        if !numeric {
            return Err(ComposeError::malformed(
                path,
                format!("range bound on non-numeric kind {}", scalar.kind.as_str()),
            ));
        }
        if !bound.value.is_finite() {
            return Err(ComposeError::malformed(path, "range bound must be finite"));
        }
    }
    if let (Some(min), Some(max)) = (scalar.minimum, scalar.maximum) {
        let empty = min.value > max.value || (min.value == max.value && (min.exclusive || max.exclusive));
        if empty {
            return Err(ComposeError::malformed(
                path,
                format!("minimum {} exceeds maximum {}", min.value, max.value),
            ));
        }
    }
    if let (Some(low), Some(high)) = (scalar.minimum_for_optimizer, scalar.maximum_for_optimizer) {
        if low > high {
            return Err(ComposeError::malformed(
                path,
                format!("minimumForOptimizer {} exceeds maximumForOptimizer {}", low, high),
            ));
        }
    }
    if scalar.distribution == Distribution::LogUniform {
        if !numeric {
            return Err(ComposeError::malformed(path, "log distribution on non-numeric kind"));
        }
        let low = scalar
            .minimum_for_optimizer
            .or(scalar.minimum.map(|b| b.value));
        if let Some(low) = low {
            if low < 0.0 || (low == 0.0 && !scalar.minimum.map_or(false, |b| b.exclusive)) {
                return Err(ComposeError::malformed(
                    path,
                    format!("log distribution needs a positive lower bound, got {}", low),
                ));
            }
        }
    }
    if let Some(values) = &scalar.enumeration {
        if values.is_empty() {
            return Err(ComposeError::malformed(path, "enum must not be empty"));
        }
        for value in values {
            let fits = match (scalar.kind, ScalarKind::of_value(value)) {
                (ScalarKind::Number, Some(ScalarKind::Number | ScalarKind::Integer)) => true,
                (kind, Some(found)) => kind == found,
                (_, None) => false,
            };
            if !fits {
                return Err(ComposeError::malformed(
                    path,
                    format!("enum member {} is not of kind {}", value, scalar.kind.as_str()),
                ));
            }
        }
    }
    Ok(())
}

/// Numeric-aware JSON equality: `1` and `1.0` are the same value
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

pub(crate) fn is_integral(n: &serde_json::Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().map_or(false, |f| f.is_finite() && f.fract() == 0.0)
}

pub(crate) fn is_integral_value(value: &Value) -> bool {
    match value {
        Value::Number(n) => is_integral(n),
        _ => false,
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<Schema> for Value {
    fn from(schema: Schema) -> Self {
        schema.to_json()
    }
}

impl TryFrom<Value> for Schema {
    type Error = ComposeError;

    fn try_from(value: Value) -> Result<Self> {
        Schema::from_json(&value)
    }
}

impl From<ScalarSchema> for Schema {
    fn from(scalar: ScalarSchema) -> Self {
        Schema::Scalar(scalar)
    }
}

impl From<ObjectSchema> for Schema {
    fn from(object: ObjectSchema) -> Self {
        Schema::Object(object)
    }
}

impl From<ArraySchema> for Schema {
    fn from(array: ArraySchema) -> Self {
        Schema::Array(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enumeration_infers_kind() {
        match Schema::enumeration(vec![json!("minmax"), json!("standard")]) {
            Schema::Scalar(s) => assert_eq!(s.kind, ScalarKind::String),
            other => panic!("Expected scalar, got {:?}", other),
        }
        match Schema::enumeration(vec![json!(0), json!(1)]) {
            Schema::Scalar(s) => assert_eq!(s.kind, ScalarKind::Integer),
            other => panic!("Expected scalar, got {:?}", other),
        }
        match Schema::enumeration(vec![json!(1), json!(0.5)]) {
            Schema::Scalar(s) => {
                assert_eq!(s.kind, ScalarKind::Number);
                assert_eq!(s.enumeration.unwrap().len(), 2);
            }
            other => panic!("Expected scalar, got {:?}", other),
        }
        assert!(matches!(
            Schema::enumeration(vec![json!("auto"), Value::Null]),
            Schema::AnyOf(ref b) if b.len() == 2
        ));
    }

    #[test]
    fn test_required_must_be_declared() {
        let mut object = ObjectSchema::new().required("x", Schema::number());
        object.required.insert("y".to_string());
        let err = Schema::object(object).check_well_formed().unwrap_err();
        assert!(matches!(err, ComposeError::SchemaMalformed { .. }));
        assert!(err.to_string().contains("'y'"));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let schema = Schema::number_range(5.0, 1.0);
        assert!(schema.check_well_formed().is_err());
        let empty = Schema::scalar(
            ScalarSchema::new(ScalarKind::Number)
                .with_minimum(1.0)
                .with_exclusive_maximum(1.0),
        );
        assert!(empty.check_well_formed().is_err());
    }

    #[test]
    fn test_bad_default_rejected() {
        let schema = Schema::object(
            ObjectSchema::new()
                .required("k", Schema::integer_range(1, 50))
                .with_default("k", json!(0)),
        );
        let err = schema.check_well_formed().unwrap_err();
        assert_eq!(err.path().unwrap().to_string(), "k");
    }

    #[test]
    fn test_log_needs_positive_range() {
        let schema = Schema::scalar(
            ScalarSchema::new(ScalarKind::Number)
                .with_minimum(0.0)
                .with_maximum(1.0)
                .log_uniform(),
        );
        assert!(schema.check_well_formed().is_err());
        let schema = Schema::scalar(
            ScalarSchema::new(ScalarKind::Number)
                .with_minimum(1e-4)
                .with_maximum(1.0)
                .log_uniform(),
        );
        assert!(schema.check_well_formed().is_ok());
    }

    #[test]
    fn test_effective_enum_filters_out_of_range() {
        let scalar = ScalarSchema::new(ScalarKind::Integer)
            .with_minimum(0.0)
            .with_enum(vec![json!(-1), json!(3)]);
        let members = scalar.effective_enum().unwrap();
        assert_eq!(members, vec![&json!(3)]);
    }

    #[test]
    fn test_values_equal_numeric() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
    }
}

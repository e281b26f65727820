//! Search spaces for hyperparameter optimization
//!
//! A [`SearchSpace`] is compiled from a hyperparameter [`Schema`] by the
//! [`SearchSpaceCompiler`]. It lists the dimensions an optimizer samples, each
//! named by its dotted path (`Classify.k`). A `oneOf`/`anyOf` in the schema
//! becomes a [`ParameterType::Conditional`] dimension whose value selects a branch;
//! the branch's own dimensions only exist when it is selected.
//!
//! Optimizer samples go back through [`SearchSpace::apply`], which rebuilds the
//! nested hyperparameter value and validates it.

mod apply;
mod compiler;
mod grid;

pub use compiler::{CompilerConfig, KeepGrids, SearchSpaceCompiler};
pub use grid::Grid;

use crate::schema::{PathSegment, Schema, SchemaPath};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Branch of a conditional dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub label: String,
    pub space: SearchSpace,
}

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float {
        low: f64,
        high: f64,
        log_scale: bool,
    },
    /// Integer parameter
    Int {
        low: i64,
        high: i64,
        log_scale: bool,
    },
    /// Categorical parameter
    Categorical {
        choices: Vec<ParameterValue>,
    },
    /// Boolean parameter
    Boolean,
    /// Which-branch choice gating the branches' own dimensions
    Conditional {
        branches: Vec<Branch>,
    },
}

/// A single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Dotted path, used as the key in [`TrialParams`]
    pub name: String,
    pub param_type: ParameterType,
    pub(crate) path: SchemaPath,
}

impl Parameter {
    pub(crate) fn at(path: &SchemaPath, param_type: ParameterType) -> Self {
        Self {
            name: dimension_name(path),
            param_type,
            path: path.clone(),
        }
    }

    /// Location of the parameter inside the hyperparameter value
    pub fn path(&self) -> &SchemaPath {
        &self.path
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.param_type, ParameterType::Conditional { .. })
    }

    /// Branch of a conditional dimension by label
    pub fn branch(&self, label: &str) -> Option<&Branch> {
        match &self.param_type {
            ParameterType::Conditional { branches } => branches.iter().find(|b| b.label == label),
            _ => None,
        }
    }

    /// Sample a random value.
    ///
    /// For a conditional dimension this only draws the branch label.
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val.clamp(*low, *high))
            }
            ParameterType::Int { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = (*low as f64).ln();
                    let log_high = (*high as f64 + 1.0).ln();
                    let drawn = (rng.gen::<f64>() * (log_high - log_low) + log_low).exp().floor() as i64;
                    drawn.clamp(*low, *high)
                } else {
                    rng.gen_range(*low..=*high)
                };
                ParameterValue::Int(val)
            }
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                choices[idx].clone()
            }
            ParameterType::Boolean => ParameterValue::Bool(rng.gen()),
            ParameterType::Conditional { branches } => {
                let idx = rng.gen_range(0..branches.len());
                ParameterValue::String(branches[idx].label.clone())
            }
        }
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    String(String),
    Bool(bool),
    Null,
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParameterValue::Null)
    }

    /// Scalar JSON value; `None` for arrays and objects
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(ParameterValue::Null),
            Value::Bool(b) => Some(ParameterValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(ParameterValue::Int(i)),
                None => n.as_f64().map(ParameterValue::Float),
            },
            Value::String(s) => Some(ParameterValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ParameterValue::Float(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
            ParameterValue::Int(v) => Value::from(*v),
            ParameterValue::String(v) => Value::String(v.clone()),
            ParameterValue::Bool(v) => Value::Bool(*v),
            ParameterValue::Null => Value::Null,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Alias for sampled configuration
pub type TrialParams = HashMap<String, ParameterValue>;

/// Search space compiled from a hyperparameter schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    /// Name reported in validation errors
    pub name: String,
    parameters: Vec<Parameter>,
    /// Hyperparameter value with containers and fixed defaults filled in
    skeleton: Option<Value>,
    /// Schema the space was compiled from
    schema: Schema,
    /// `schema` with every `allOf` constraint reduced to its domain
    domain: Schema,
}

impl SearchSpace {
    pub(crate) fn from_parts(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        skeleton: Option<Value>,
        schema: Schema,
        domain: Schema,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            skeleton,
            schema,
            domain,
        }
    }

    /// Top-level parameters; dimensions of conditional branches sit inside them
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn domain_schema(&self) -> &Schema {
        &self.domain
    }

    /// Fixed part of every configuration
    pub fn skeleton(&self) -> Option<&Value> {
        self.skeleton.as_ref()
    }

    /// Look up a parameter anywhere in the space, including inside branches
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.all_parameters().into_iter().find(|p| p.name == name)
    }

    /// Every parameter, depth first through conditional branches
    pub fn all_parameters(&self) -> Vec<&Parameter> {
        let mut found = Vec::new();
        let mut stack: Vec<&Parameter> = self.parameters.iter().rev().collect();
        while let Some(param) = stack.pop() {
            found.push(param);
            if let ParameterType::Conditional { branches } = &param.param_type {
                for branch in branches.iter().rev() {
                    stack.extend(branch.space.parameters.iter().rev());
                }
            }
        }
        found
    }

    /// Sample a random configuration; only active dimensions are drawn
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        let mut params = TrialParams::new();
        self.sample_into(rng, &mut params);
        params
    }

    fn sample_into(&self, rng: &mut impl Rng, params: &mut TrialParams) {
        for param in &self.parameters {
            let value = param.sample(rng);
            if let ParameterType::Conditional { branches } = &param.param_type {
                if let Some(branch) = value.as_string().and_then(|l| branches.iter().find(|b| b.label == l)) {
                    branch.space.sample_into(rng, params);
                }
            }
            params.insert(param.name.clone(), value);
        }
    }

    /// Number of top-level parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Get parameter names in order
    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

/// Name of the root-level which-branch dimension
pub const ROOT_SELECTOR: &str = "choice";

/// Dotted name of a dimension at `path`
pub(crate) fn dimension_name(path: &SchemaPath) -> String {
    if path.is_root() {
        return ROOT_SELECTOR.to_string();
    }
    path.segments()
        .iter()
        .map(|segment| match segment {
            PathSegment::Property(name) => name.clone(),
            PathSegment::Index(i) => i.to_string(),
            PathSegment::Items => "[]".to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Place `value` at `path` inside `target`, creating containers on the way
pub(crate) fn set_at(target: &mut Value, path: &[PathSegment], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *target = value;
        return;
    };
    match head {
        PathSegment::Property(name) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(map) = target {
                let slot = map.entry(name.clone()).or_insert(Value::Null);
                set_at(slot, rest, value);
            }
        }
        PathSegment::Index(i) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                if items.len() <= *i {
                    items.resize(*i + 1, Value::Null);
                }
                set_at(&mut items[*i], rest, value);
            }
        }
        PathSegment::Items => set_at(target, rest, value),
    }
}

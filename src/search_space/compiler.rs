//! Hyperparameter schema to search space compilation

use super::{Branch, Parameter, ParameterType, ParameterValue, SearchSpace};
use crate::checker::{are_disjoint, validate};
use crate::error::{ComposeError, Result};
use crate::operator::Operator;
use crate::schema::{values_equal, ArraySchema, Distribution, ObjectSchema, ScalarKind, ScalarSchema, Schema, SchemaPath};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// How many grids (combinations of conditional branches) to keep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KeepGrids {
    /// Fraction in (0, 1) of the grids
    Fraction(f64),
    /// Number of grids
    Count(usize),
}

/// Configuration for search-space compilation and grid enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Grid points per numeric dimension
    pub grid_points: usize,

    /// Maximum number of configurations a grid may enumerate
    pub max_grid_size: usize,

    /// Keep only part of the grids; `None` keeps all
    pub keep_grids: Option<KeepGrids>,

    /// Drop union branches that cannot be compiled instead of failing
    pub drop_uncompilable_branches: bool,

    /// Cache compiled spaces per schema
    pub cache_enabled: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            grid_points: 5,
            max_grid_size: 10_000,
            keep_grids: None,
            drop_uncompilable_branches: true,
            cache_enabled: true,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set grid points per numeric dimension
    pub fn with_grid_points(mut self, n: usize) -> Self {
        self.grid_points = n;
        self
    }

    /// Builder method to set the grid size cap
    pub fn with_max_grid_size(mut self, n: usize) -> Self {
        self.max_grid_size = n;
        self
    }

    /// Builder method to keep part of the grids
    pub fn with_keep_grids(mut self, keep: KeepGrids) -> Self {
        self.keep_grids = Some(keep);
        self
    }

    /// Builder method to fail on uncompilable union branches
    pub fn with_strict_branches(mut self) -> Self {
        self.drop_uncompilable_branches = false;
        self
    }

    /// Builder method to toggle caching
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_points == 0 {
            return Err(ComposeError::ConfigError("grid_points must be at least 1".to_string()));
        }
        if self.max_grid_size == 0 {
            return Err(ComposeError::ConfigError("max_grid_size must be at least 1".to_string()));
        }
        match self.keep_grids {
            Some(KeepGrids::Fraction(f)) if !(f > 0.0 && f < 1.0) => Err(ComposeError::ConfigError(
                format!("keep_grids fraction must be in (0, 1), got {}", f),
            )),
            Some(KeepGrids::Count(0)) => Err(ComposeError::ConfigError(
                "keep_grids count must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Name given to spaces compiled from a bare schema
const DEFAULT_SPACE_NAME: &str = "hyperparameters";

/// Compiles hyperparameter schemas into search spaces.
///
/// Compilation is read-only; results are cached per distinct schema.
#[derive(Debug, Default)]
pub struct SearchSpaceCompiler {
    config: CompilerConfig,
    cache: RwLock<HashMap<String, Arc<SearchSpace>>>,
}

/// Dimensions and fixed part compiled from one schema node
struct Compiled {
    parameters: Vec<Parameter>,
    skeleton: Option<Value>,
}

impl Compiled {
    fn fixed(value: Value) -> Self {
        Self {
            parameters: Vec::new(),
            skeleton: Some(value),
        }
    }

    fn dimension(path: &SchemaPath, param_type: ParameterType) -> Self {
        Self {
            parameters: vec![Parameter::at(path, param_type)],
            skeleton: None,
        }
    }
}

impl SearchSpaceCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile an operator's hyperparameter schema
    pub fn compile_operator(&self, operator: &Operator) -> Result<Arc<SearchSpace>> {
        self.compile_named(operator.name(), operator.hyperparameter_schema())
    }

    /// Compile a hyperparameter schema
    pub fn compile(&self, schema: &Schema) -> Result<Arc<SearchSpace>> {
        self.compile_named(DEFAULT_SPACE_NAME, schema)
    }

    pub fn compile_named(&self, name: &str, schema: &Schema) -> Result<Arc<SearchSpace>> {
        let key = format!("{}\u{0}{}", name, schema.to_json());
        if self.config.cache_enabled {
            if let Some(space) = self.cache.read().get(&key) {
                debug!(space = %name, "Search space cache hit");
                return Ok(Arc::clone(space));
            }
        }

        schema.check_well_formed()?;
        let domain = schema.domain_part();
        let compiled = self.compile_node(&domain, &SchemaPath::root())?;
        let space = Arc::new(SearchSpace::from_parts(
            name,
            compiled.parameters,
            compiled.skeleton,
            schema.clone(),
            domain,
        ));
        info!(
            space = %name,
            dimensions = space.all_parameters().len(),
            constrained = schema.has_constraints(),
            "Compiled search space"
        );

        if self.config.cache_enabled {
            self.cache.write().insert(key, Arc::clone(&space));
        }
        Ok(space)
    }

    /// Number of cached spaces
    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    fn compile_node(&self, schema: &Schema, path: &SchemaPath) -> Result<Compiled> {
        match schema {
            Schema::Any => Err(unbounded(path, "unconstrained value has no search domain")),
            Schema::Scalar(scalar) => compile_scalar(scalar, path),
            Schema::Object(object) => self.compile_object(object, path),
            Schema::Array(array) => self.compile_array(array, path),
            Schema::AllOf(_) => self.compile_node(&schema.domain_part(), path),
            Schema::AnyOf(branches) => self.compile_union(schema, branches, false, path),
            Schema::OneOf(branches) => self.compile_union(schema, branches, true, path),
        }
    }

    fn compile_object(&self, object: &ObjectSchema, path: &SchemaPath) -> Result<Compiled> {
        let mut parameters = Vec::new();
        let mut skeleton = Map::new();
        for (name, property) in &object.properties {
            let default = object.defaults.get(name);
            let required = object.required.contains(name);
            if !object.is_relevant(name) {
                if let Some(value) = default {
                    skeleton.insert(name.clone(), value.clone());
                    continue;
                }
                if !required {
                    continue;
                }
            }
            let property_path = path.property(name);
            match self.compile_node(property, &property_path) {
                Ok(compiled) => {
                    parameters.extend(compiled.parameters);
                    if let Some(value) = compiled.skeleton {
                        skeleton.insert(name.clone(), value);
                    }
                }
                Err(e) => match default {
                    Some(value) => {
                        debug!(path = %property_path, error = %e, "Fixing property to its default");
                        skeleton.insert(name.clone(), value.clone());
                    }
                    None if !required => {
                        debug!(path = %property_path, error = %e, "Omitting optional property");
                    }
                    None => return Err(e),
                },
            }
        }
        Ok(Compiled {
            parameters,
            skeleton: Some(Value::Object(skeleton)),
        })
    }

    fn compile_array(&self, array: &ArraySchema, path: &SchemaPath) -> Result<Compiled> {
        let length = match (array.min_items, array.max_items) {
            (Some(min), Some(max)) if min == max => max,
            _ => return Err(unbounded(path, "only fixed-length arrays have a search domain")),
        };
        let mut parameters = Vec::new();
        let mut items = Vec::with_capacity(length);
        for i in 0..length {
            let compiled = self.compile_node(&array.items, &path.index(i))?;
            parameters.extend(compiled.parameters);
            items.push(compiled.skeleton.unwrap_or(Value::Null));
        }
        Ok(Compiled {
            parameters,
            skeleton: Some(Value::Array(items)),
        })
    }

    /// Compile a union into one categorical or one which-branch selector.
    ///
    /// Unions nested directly inside the union share its path, so their branches
    /// are spliced into the parent selector. Every branch of a `oneOf` must be
    /// disjoint from its siblings, or samples drawn for one branch could match two.
    fn compile_union(&self, union: &Schema, branches: &[Schema], one_of: bool, path: &SchemaPath) -> Result<Compiled> {
        let mut leaves = Vec::new();
        let mut exclusive = Vec::new();
        splice_union(branches, one_of, &mut leaves, &mut exclusive);

        if let Some(choices) = enum_union(&leaves, union) {
            return categorical(choices, path);
        }

        let mut compiled = Vec::with_capacity(leaves.len());
        let mut first_error = None;
        for (i, leaf) in leaves.iter().enumerate() {
            match self.compile_node(leaf, path) {
                Ok(c) => compiled.push((i, branch_label(leaf, i), *leaf, c)),
                Err(e) if self.config.drop_uncompilable_branches => {
                    debug!(path = %path, branch = i, error = %e, "Dropping uncompilable branch");
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        // a sample drawn for a kept branch must not also match an excluded sibling
        let kept: Vec<usize> = compiled.iter().map(|(i, _, _, _)| *i).collect();
        for &(x, y) in &exclusive {
            if (kept.contains(&x) || kept.contains(&y)) && !are_disjoint(leaves[x], leaves[y]) {
                return Err(unbounded(
                    path,
                    format!("oneOf branches {} and {} may overlap", x, y),
                ));
            }
        }

        if compiled.len() <= 1 {
            return match compiled.pop() {
                Some((_, _, _, only)) => Ok(only),
                None => Err(first_error.unwrap_or_else(|| unbounded(path, "no branch has a search domain"))),
            };
        }

        let mut labels: Vec<String> = compiled.iter().map(|(_, label, _, _)| label.clone()).collect();
        let unique = labels.iter().enumerate().all(|(i, l)| !labels[..i].contains(l));
        if !unique {
            labels = (0..compiled.len()).map(|i| i.to_string()).collect();
        }
        let branches = labels
            .into_iter()
            .zip(compiled)
            .map(|(label, (_, _, schema, c))| Branch {
                space: SearchSpace::from_parts(label.clone(), c.parameters, c.skeleton, schema.clone(), schema.clone()),
                label,
            })
            .collect();
        Ok(Compiled::dimension(path, ParameterType::Conditional { branches }))
    }
}

/// Flatten unions nested at the same path, recording the leaf pairs a `oneOf`
/// needs to be disjoint
fn splice_union<'a>(
    branches: &'a [Schema],
    one_of: bool,
    leaves: &mut Vec<&'a Schema>,
    exclusive: &mut Vec<(usize, usize)>,
) {
    let mut groups = Vec::with_capacity(branches.len());
    for branch in branches {
        let start = leaves.len();
        match branch {
            Schema::AnyOf(inner) => splice_union(inner, false, leaves, exclusive),
            Schema::OneOf(inner) => splice_union(inner, true, leaves, exclusive),
            other => leaves.push(other),
        }
        groups.push(start..leaves.len());
    }
    if one_of {
        for (i, group) in groups.iter().enumerate() {
            for sibling in &groups[i + 1..] {
                for x in group.clone() {
                    exclusive.extend(sibling.clone().map(|y| (x, y)));
                }
            }
        }
    }
}

fn compile_scalar(scalar: &ScalarSchema, path: &SchemaPath) -> Result<Compiled> {
    if let Some(members) = scalar.effective_enum() {
        let choices = members.into_iter().filter_map(ParameterValue::from_value).collect();
        return categorical(choices, path);
    }
    match scalar.kind {
        ScalarKind::Boolean => Ok(Compiled::dimension(path, ParameterType::Boolean)),
        ScalarKind::Null => Ok(Compiled::fixed(Value::Null)),
        ScalarKind::String => Err(unbounded(path, "string without enum has no search domain")),
        ScalarKind::Number | ScalarKind::Integer => compile_numeric(scalar, path),
    }
}

fn compile_numeric(scalar: &ScalarSchema, path: &SchemaPath) -> Result<Compiled> {
    let integer = scalar.kind == ScalarKind::Integer;
    let schema_low = scalar.minimum.map(|b| match (integer, b.exclusive) {
        (true, true) => b.value.floor() + 1.0,
        (true, false) => b.value.ceil(),
        (false, true) => next_up(b.value),
        (false, false) => b.value,
    });
    let schema_high = scalar.maximum.map(|b| match (integer, b.exclusive) {
        (true, true) => b.value.ceil() - 1.0,
        (true, false) => b.value.floor(),
        (false, true) => -next_up(-b.value),
        (false, false) => b.value,
    });
    let optimizer_low = scalar
        .minimum_for_optimizer
        .map(|v| if integer { v.ceil() } else { v });
    let optimizer_high = scalar
        .maximum_for_optimizer
        .map(|v| if integer { v.floor() } else { v });

    let low = match (optimizer_low, schema_low) {
        (Some(o), Some(s)) => Some(o.max(s)),
        (o, s) => o.or(s),
    };
    let high = match (optimizer_high, schema_high) {
        (Some(o), Some(s)) => Some(o.min(s)),
        (o, s) => o.or(s),
    };
    let (Some(low), Some(high)) = (low, high) else {
        return Err(unbounded(
            path,
            "numeric range needs both bounds or minimumForOptimizer/maximumForOptimizer",
        ));
    };
    if low > high {
        return Err(unbounded(path, format!("empty range [{}, {}]", low, high)));
    }
    if low == high {
        let value = if integer { Value::from(low as i64) } else { Value::from(low) };
        return Ok(Compiled::fixed(value));
    }

    let log_scale = scalar.distribution == Distribution::LogUniform && low > 0.0;
    if scalar.distribution == Distribution::LogUniform && !log_scale {
        debug!(path = %path, low, "Sampling uniformly: log range starts at zero");
    }
    let param_type = if integer {
        ParameterType::Int {
            low: low as i64,
            high: high as i64,
            log_scale,
        }
    } else {
        ParameterType::Float { low, high, log_scale }
    };
    Ok(Compiled::dimension(path, param_type))
}

fn categorical(choices: Vec<ParameterValue>, path: &SchemaPath) -> Result<Compiled> {
    match choices.len() {
        0 => Err(unbounded(path, "no enum member satisfies the schema")),
        1 => Ok(Compiled::fixed(choices[0].to_value())),
        _ => Ok(Compiled::dimension(path, ParameterType::Categorical { choices })),
    }
}

/// Members of a union made only of enums and nulls that the union accepts
fn enum_union(leaves: &[&Schema], union: &Schema) -> Option<Vec<ParameterValue>> {
    let mut values: Vec<Value> = Vec::new();
    for leaf in leaves {
        let Schema::Scalar(scalar) = leaf else {
            return None;
        };
        let members: Vec<Value> = match scalar.effective_enum() {
            Some(members) => members.into_iter().cloned().collect(),
            None if scalar.kind == ScalarKind::Null => vec![Value::Null],
            None => return None,
        };
        for member in members {
            if !values.iter().any(|v| values_equal(v, &member)) {
                values.push(member);
            }
        }
    }
    // a oneOf rejects members shared by two branches
    Some(
        values
            .iter()
            .filter(|v| validate(v, union).is_ok())
            .filter_map(ParameterValue::from_value)
            .collect(),
    )
}

/// The single required key of a one-property object, else the branch index
fn branch_label(branch: &Schema, index: usize) -> String {
    match branch {
        Schema::Object(object) if object.properties.len() == 1 => object
            .properties
            .keys()
            .next()
            .filter(|key| object.required.contains(*key))
            .cloned()
            .unwrap_or_else(|| index.to_string()),
        _ => index.to_string(),
    }
}

fn unbounded(path: &SchemaPath, reason: impl Into<String>) -> ComposeError {
    ComposeError::UnboundedDomain {
        path: path.clone(),
        reason: reason.into(),
    }
}

/// Smallest float above `v`
fn next_up(v: f64) -> f64 {
    if v.is_nan() || v == f64::INFINITY {
        return v;
    }
    if v == 0.0 {
        return f64::from_bits(1);
    }
    let bits = v.to_bits();
    if v > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compiler() -> SearchSpaceCompiler {
        SearchSpaceCompiler::new(CompilerConfig::default())
    }

    #[test]
    fn test_numeric_dimensions() {
        let schema = Schema::object(
            ObjectSchema::new()
                .required("k", Schema::integer_range(1, 50))
                .required(
                    "C",
                    Schema::scalar(
                        ScalarSchema::new(ScalarKind::Number)
                            .with_exclusive_minimum(0.0)
                            .with_optimizer_range(0.03125, 32768.0)
                            .log_uniform(),
                    ),
                ),
        );
        let space = compiler().compile(&schema).unwrap();
        assert_eq!(space.param_names(), vec!["C", "k"]);
        assert_eq!(
            space.get("k").unwrap().param_type,
            ParameterType::Int { low: 1, high: 50, log_scale: false }
        );
        assert_eq!(
            space.get("C").unwrap().param_type,
            ParameterType::Float { low: 0.03125, high: 32768.0, log_scale: true }
        );
    }

    #[test]
    fn test_exclusive_bounds_are_nudged() {
        let schema = Schema::scalar(
            ScalarSchema::new(ScalarKind::Integer)
                .with_exclusive_minimum(0.0)
                .with_exclusive_maximum(10.0),
        );
        let space = compiler().compile(&schema).unwrap();
        assert_eq!(
            space.parameters()[0].param_type,
            ParameterType::Int { low: 1, high: 9, log_scale: false }
        );

        let schema = Schema::scalar(ScalarSchema::new(ScalarKind::Number).with_exclusive_minimum(0.0).with_maximum(1.0));
        let space = compiler().compile(&schema).unwrap();
        match space.parameters()[0].param_type {
            ParameterType::Float { low, .. } => assert!(low > 0.0 && low < 1e-300),
            ref other => panic!("Expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_unbounded_fails() {
        let err = compiler()
            .compile(&Schema::object(ObjectSchema::new().required("tol", Schema::number())))
            .unwrap_err();
        match err {
            ComposeError::UnboundedDomain { path, .. } => assert_eq!(path.to_string(), "tol"),
            other => panic!("Expected unbounded domain, got {:?}", other),
        }
    }

    #[test]
    fn test_irrelevant_and_uncompilable_properties() {
        let schema = Schema::object(
            ObjectSchema::new()
                .required("k", Schema::integer_range(1, 50))
                .required("tol", Schema::number())
                .optional("verbose", Schema::boolean())
                .optional("name", Schema::string())
                .with_default("tol", json!(0.001))
                .with_default("verbose", json!(false))
                .with_relevant(["k", "tol"]),
        );
        let space = compiler().compile(&schema).unwrap();
        assert_eq!(space.param_names(), vec!["k"]);
        assert_eq!(space.skeleton(), Some(&json!({"tol": 0.001, "verbose": false})));
    }

    #[test]
    fn test_enum_null_union_is_one_categorical() {
        let schema = Schema::object(ObjectSchema::new().required(
            "gamma",
            Schema::any_of(vec![
                Schema::enumeration(vec![json!("scale"), json!("auto")]),
                Schema::null(),
            ]),
        ));
        let space = compiler().compile(&schema).unwrap();
        match &space.get("gamma").unwrap().param_type {
            ParameterType::Categorical { choices } => {
                assert_eq!(choices.len(), 3);
                assert!(choices.contains(&ParameterValue::Null));
            }
            other => panic!("Expected categorical, got {:?}", other),
        }
    }

    #[test]
    fn test_one_of_becomes_conditional() {
        let knn = Schema::object(ObjectSchema::new().required("k", Schema::integer_range(1, 50)).closed());
        let lr = Schema::object(ObjectSchema::new().required("C", Schema::number_range(0.1, 10.0)).closed());
        let schema = Schema::one_of(vec![
            Schema::object(ObjectSchema::new().required("KNN", knn).closed()),
            Schema::object(ObjectSchema::new().required("LR", lr).closed()),
        ]);
        let space = compiler().compile(&schema).unwrap();
        assert_eq!(space.param_names(), vec!["choice"]);
        let selector = &space.parameters()[0];
        assert_eq!(selector.branch("KNN").unwrap().space.param_names(), vec!["KNN.k"]);
        assert_eq!(selector.branch("LR").unwrap().space.param_names(), vec!["LR.C"]);
        assert_eq!(space.all_parameters().len(), 3);
    }

    #[test]
    fn test_uncompilable_branch_dropped_or_fatal() {
        let schema = Schema::any_of(vec![Schema::number(), Schema::integer_range(1, 3)]);
        let space = compiler().compile(&schema).unwrap();
        assert_eq!(
            space.parameters()[0].param_type,
            ParameterType::Int { low: 1, high: 3, log_scale: false }
        );
        let strict = SearchSpaceCompiler::new(CompilerConfig::new().with_strict_branches());
        assert!(strict.compile(&schema).is_err());
    }

    fn keyed(key: &str, low: i64, high: i64) -> Schema {
        Schema::object(ObjectSchema::new().required(key, Schema::integer_range(low, high)).closed())
    }

    fn assert_samples_apply(space: &SearchSpace) {
        use rand::SeedableRng;
        let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(42);
        for _ in 0..50 {
            let sample = space.sample(&mut rng);
            assert!(space.apply(&sample).is_ok(), "rejected {:?}", sample);
        }
    }

    #[test]
    fn test_one_of_enums_drop_shared_members() {
        let schema = Schema::object(ObjectSchema::new().required(
            "p",
            Schema::one_of(vec![
                Schema::enumeration(vec![json!(1), json!(2)]),
                Schema::enumeration(vec![json!(2), json!(3)]),
            ]),
        ));
        let space = compiler().compile(&schema).unwrap();
        assert_eq!(
            space.get("p").unwrap().param_type,
            ParameterType::Categorical {
                choices: vec![ParameterValue::Int(1), ParameterValue::Int(3)]
            }
        );
        assert_samples_apply(&space);
    }

    #[test]
    fn test_overlapping_one_of_branches_rejected() {
        let open = |low, high| Schema::object(ObjectSchema::new().required("k", Schema::integer_range(low, high)));
        let overlapping = Schema::one_of(vec![open(1, 5), open(3, 9)]);
        assert!(matches!(
            compiler().compile(&overlapping),
            Err(ComposeError::UnboundedDomain { .. })
        ));

        // the same branches under anyOf may overlap
        let space = compiler().compile(&Schema::any_of(vec![open(1, 5), open(3, 9)])).unwrap();
        assert_samples_apply(&space);

        let disjoint = Schema::one_of(vec![open(1, 2), open(3, 9)]);
        let space = compiler().compile(&disjoint).unwrap();
        assert_samples_apply(&space);
    }

    #[test]
    fn test_dropped_branch_still_excludes() {
        // samples from 1..3 would also be numbers, matching both branches
        let schema = Schema::one_of(vec![Schema::number(), Schema::integer_range(1, 3)]);
        assert!(compiler().compile(&schema).is_err());
    }

    #[test]
    fn test_nested_unions_share_one_selector() {
        let schema = Schema::any_of(vec![
            Schema::any_of(vec![keyed("a", 1, 5), keyed("b", 1, 5)]),
            keyed("c", 1, 5),
        ]);
        let space = compiler().compile(&schema).unwrap();
        assert_eq!(space.param_names(), vec!["choice"]);
        let names: Vec<&str> = space.all_parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["choice", "a", "b", "c"]);
        assert_samples_apply(&space);

        let nested_one_of = Schema::one_of(vec![
            Schema::one_of(vec![keyed("a", 1, 5), keyed("b", 1, 5)]),
            keyed("c", 1, 5),
        ]);
        let space = compiler().compile(&nested_one_of).unwrap();
        assert_eq!(space.all_parameters().len(), 4);
        assert_samples_apply(&space);
    }

    #[test]
    fn test_cache_hits_share_space() {
        let compiler = compiler();
        let schema = Schema::object(ObjectSchema::new().required("k", Schema::integer_range(1, 5)));
        let a = compiler.compile(&schema).unwrap();
        let b = compiler.compile(&schema).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(compiler.cache_len(), 1);
        compiler.clear_cache();
        assert_eq!(compiler.cache_len(), 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(CompilerConfig::default().validate().is_ok());
        assert!(CompilerConfig::new().with_grid_points(0).validate().is_err());
        assert!(CompilerConfig::new().with_keep_grids(KeepGrids::Fraction(1.5)).validate().is_err());
        assert!(CompilerConfig::new().with_keep_grids(KeepGrids::Count(2)).validate().is_ok());
    }
}

//! Pipeline combinators
//!
//! Three combinators build composite operators from children:
//!
//! - [`sequential`] (`a >> b`): each step consumes the previous step's output.
//!   Every edge is type-checked when the pipeline is built.
//! - [`choice`] (`a | b`): exactly one branch is selected; the selection is itself
//!   a hyperparameter.
//! - [`parallel`] (`a & b`): branches run side by side, their inputs and outputs
//!   aggregated into objects keyed by branch.
//!
//! Composites are operators, so they nest freely. Schemas are derived from the
//! children once at construction and can be recomputed with
//! [`Operator::rederive`].

use crate::checker::{check_subsumption, is_subsumed_by};
use crate::error::{ComposeError, Result};
use crate::operator::{DerivedSchemas, Operator, OperatorKind};
use crate::schema::{ObjectSchema, Schema};
use tracing::debug;

/// Default name of a sequential composite
pub const SEQUENTIAL_NAME: &str = "pipeline";
/// Default name of a choice composite
pub const CHOICE_NAME: &str = "choice";
/// Default name of a parallel composite
pub const PARALLEL_NAME: &str = "parallel";

/// Combinator of a composite operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Sequential,
    Choice,
    Parallel,
}

impl Combinator {
    pub fn default_name(&self) -> &'static str {
        match self {
            Combinator::Sequential => SEQUENTIAL_NAME,
            Combinator::Choice => CHOICE_NAME,
            Combinator::Parallel => PARALLEL_NAME,
        }
    }

    fn matches(&self, operator: &Operator) -> bool {
        matches!(
            (self, operator.kind()),
            (Combinator::Sequential, OperatorKind::Sequential(_))
                | (Combinator::Choice, OperatorKind::Choice(_))
                | (Combinator::Parallel, OperatorKind::Parallel(_))
        )
    }

    /// Apply this combinator to `children`
    pub fn combine(&self, children: Vec<Operator>) -> Result<Operator> {
        match self {
            Combinator::Sequential => sequential(children),
            Combinator::Choice => choice(children),
            Combinator::Parallel => parallel(children),
        }
    }
}

/// Compose steps so that each consumes the previous step's output
pub fn sequential(steps: Vec<Operator>) -> Result<Operator> {
    let steps = flatten(Combinator::Sequential, steps);
    let schemas = derive_sequential(&steps)?;
    Ok(Operator::composite(SEQUENTIAL_NAME, OperatorKind::Sequential(steps), schemas))
}

/// Compose alternatives of which exactly one is selected
pub fn choice(branches: Vec<Operator>) -> Result<Operator> {
    let branches = flatten(Combinator::Choice, branches);
    let schemas = derive_choice(&branches)?;
    Ok(Operator::composite(CHOICE_NAME, OperatorKind::Choice(branches), schemas))
}

/// Compose independent branches that run side by side
pub fn parallel(branches: Vec<Operator>) -> Result<Operator> {
    let branches = flatten(Combinator::Parallel, branches);
    let schemas = derive_parallel(&branches)?;
    Ok(Operator::composite(PARALLEL_NAME, OperatorKind::Parallel(branches), schemas))
}

impl Operator {
    /// `self >> next`
    pub fn then(&self, next: &Operator) -> Result<Operator> {
        sequential(vec![self.clone(), next.clone()])
    }

    /// `self | other`
    pub fn or(&self, other: &Operator) -> Result<Operator> {
        choice(vec![self.clone(), other.clone()])
    }

    /// `self & other`
    pub fn and(&self, other: &Operator) -> Result<Operator> {
        parallel(vec![self.clone(), other.clone()])
    }
}

/// Splice in children that are unnamed composites of the same combinator
fn flatten(combinator: Combinator, children: Vec<Operator>) -> Vec<Operator> {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        if combinator.matches(&child) && child.name() == combinator.default_name() {
            flat.extend(child.children().iter().cloned());
        } else {
            flat.push(child);
        }
    }
    flat
}

/// Keys under which children's schemas are nested: the child's name, with later
/// duplicates suffixed `_1`, `_2`, ...
pub fn child_keys(children: &[Operator]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(children.len());
    for child in children {
        let base = child.name();
        let mut key = base.to_string();
        let mut suffix = 0;
        while keys.contains(&key) {
            suffix += 1;
            key = format!("{}_{}", base, suffix);
        }
        keys.push(key);
    }
    keys
}

fn require_children(combinator: Combinator, children: &[Operator]) -> Result<()> {
    if children.is_empty() {
        return Err(ComposeError::EmptyComposition(format!(
            "{} needs at least one child",
            combinator.default_name()
        )));
    }
    Ok(())
}

fn keyed_object(keys: &[String], schemas: impl Iterator<Item = Schema>) -> ObjectSchema {
    keys.iter()
        .zip(schemas)
        .fold(ObjectSchema::new(), |object, (key, schema)| object.required(key.clone(), schema))
}

pub(crate) fn derive_sequential(steps: &[Operator]) -> Result<DerivedSchemas> {
    require_children(Combinator::Sequential, steps)?;
    for pair in steps.windows(2) {
        let (producer, consumer) = (&pair[0], &pair[1]);
        debug!(producer = %producer, consumer = %consumer, "Checking sequential edge");
        check_subsumption(producer.output_schema(), consumer.input_schema()).map_err(|e| match e {
            ComposeError::TypeMismatch { path, reason, producer: p, consumer: c } => {
                ComposeError::TypeMismatch {
                    path,
                    reason: format!("{} >> {}: {}", producer, consumer, reason),
                    producer: p,
                    consumer: c,
                }
            }
            other => other,
        })?;
    }
    let keys = child_keys(steps);
    let hyperparameters = keyed_object(&keys, steps.iter().map(|s| s.hyperparameter_schema().clone())).closed();
    let (first, last) = (&steps[0], &steps[steps.len() - 1]);
    Ok(DerivedSchemas {
        input: first.input_schema().clone(),
        output: last.output_schema().clone(),
        hyperparameters: Schema::object(hyperparameters),
    })
}

pub(crate) fn derive_choice(branches: &[Operator]) -> Result<DerivedSchemas> {
    require_children(Combinator::Choice, branches)?;
    for (i, a) in branches.iter().enumerate() {
        for b in &branches[i + 1..] {
            let (x, y) = (a.input_schema(), b.input_schema());
            if !is_subsumed_by(x, y) && !is_subsumed_by(y, x) {
                let cause = check_subsumption(x, y)
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                return Err(ComposeError::mismatch(
                    &crate::schema::SchemaPath::root(),
                    format!("choice branches {} and {} accept incompatible inputs ({})", a, b, cause),
                    x,
                    y,
                ));
            }
        }
    }
    let keys = child_keys(branches);
    let selectors = keys
        .iter()
        .zip(branches)
        .map(|(key, branch)| {
            Schema::object(
                ObjectSchema::new()
                    .required(key.clone(), branch.hyperparameter_schema().clone())
                    .closed(),
            )
        })
        .collect();
    Ok(DerivedSchemas {
        input: Schema::union_of(branches.iter().map(|b| b.input_schema().clone()).collect()),
        output: Schema::union_of(branches.iter().map(|b| b.output_schema().clone()).collect()),
        hyperparameters: Schema::one_of(selectors),
    })
}

pub(crate) fn derive_parallel(branches: &[Operator]) -> Result<DerivedSchemas> {
    require_children(Combinator::Parallel, branches)?;
    let keys = child_keys(branches);
    let input = keyed_object(&keys, branches.iter().map(|b| b.input_schema().clone()));
    let output = keyed_object(&keys, branches.iter().map(|b| b.output_schema().clone())).closed();
    let hyperparameters = keyed_object(&keys, branches.iter().map(|b| b.hyperparameter_schema().clone())).closed();
    Ok(DerivedSchemas {
        input: Schema::object(input),
        output: Schema::object(output),
        hyperparameters: Schema::object(hyperparameters),
    })
}

//! Operators
//!
//! An [`Operator`] is a named unit with an input schema, an output schema and a
//! hyperparameter schema. Leaf operators wrap an opaque [`Implementation`];
//! composite operators (pipelines) are built by the [`crate::algebra`] combinators
//! and carry schemas derived from their children.
//!
//! Operators are immutable and cheap to clone: every clone shares one node.

mod description;
mod registry;

pub use description::PipelineDescription;
pub use registry::OperatorRegistry;

use crate::algebra;
use crate::checker;
use crate::error::{ComposeError, Result, ValidationOrigin};
use crate::schema::Schema;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Opaque handle on a concrete algorithm.
///
/// The composition core never trains or predicts; it only validates
/// hyperparameters before handing them to [`Implementation::configure`].
pub trait Implementation: Send + Sync + fmt::Debug {
    /// Return a handle configured with already-validated hyperparameters
    fn configure(&self, hyperparams: &Value) -> Result<Arc<dyn Implementation>>;

    /// Fit on input data and optional targets, returning the trained handle
    fn fit(&self, x: &Value, y: Option<&Value>) -> Result<Arc<dyn Implementation>>;

    /// Produce output for input data
    fn predict(&self, x: &Value) -> Result<Value>;
}

/// Schemas carried by an operator
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSchemas {
    pub input: Schema,
    pub output: Schema,
    pub hyperparameters: Schema,
}

/// What an operator is made of
#[derive(Debug, Clone)]
pub enum OperatorKind {
    /// Leaf operator wrapping one algorithm
    Individual(Option<Arc<dyn Implementation>>),
    /// Steps run one after another
    Sequential(Vec<Operator>),
    /// Exactly one branch is selected
    Choice(Vec<Operator>),
    /// Every branch runs on the same input
    Parallel(Vec<Operator>),
}

#[derive(Debug)]
struct OperatorNode {
    name: String,
    kind: OperatorKind,
    schemas: DerivedSchemas,
}

/// Shared handle on an immutable operator node
#[derive(Debug, Clone)]
pub struct Operator(Arc<OperatorNode>);

impl Operator {
    /// Start building a leaf operator
    pub fn individual(name: impl Into<String>) -> OperatorBuilder {
        OperatorBuilder::new(name)
    }

    pub(crate) fn composite(name: impl Into<String>, kind: OperatorKind, schemas: DerivedSchemas) -> Self {
        Operator(Arc::new(OperatorNode {
            name: name.into(),
            kind,
            schemas,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &OperatorKind {
        &self.0.kind
    }

    pub fn input_schema(&self) -> &Schema {
        &self.0.schemas.input
    }

    pub fn output_schema(&self) -> &Schema {
        &self.0.schemas.output
    }

    pub fn hyperparameter_schema(&self) -> &Schema {
        &self.0.schemas.hyperparameters
    }

    pub fn schemas(&self) -> &DerivedSchemas {
        &self.0.schemas
    }

    pub fn is_individual(&self) -> bool {
        matches!(self.0.kind, OperatorKind::Individual(_))
    }

    /// Direct children of a composite; empty for leaves
    pub fn children(&self) -> &[Operator] {
        match &self.0.kind {
            OperatorKind::Individual(_) => &[],
            OperatorKind::Sequential(children)
            | OperatorKind::Choice(children)
            | OperatorKind::Parallel(children) => children,
        }
    }

    pub fn implementation(&self) -> Option<&Arc<dyn Implementation>> {
        match &self.0.kind {
            OperatorKind::Individual(implementation) => implementation.as_ref(),
            _ => None,
        }
    }

    /// Combinator nesting depth: 0 for a leaf, one more than the deepest child otherwise
    pub fn depth(&self) -> usize {
        self.children()
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Number of leaf operators in the tree
    pub fn leaf_count(&self) -> usize {
        if self.is_individual() {
            1
        } else {
            self.children().iter().map(Operator::leaf_count).sum()
        }
    }

    /// Whether both handles point at the same node
    pub fn ptr_eq(&self, other: &Operator) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Same operator under another name
    pub fn renamed(&self, name: impl Into<String>) -> Operator {
        Operator(Arc::new(OperatorNode {
            name: name.into(),
            kind: self.0.kind.clone(),
            schemas: self.0.schemas.clone(),
        }))
    }

    /// Recompute this operator's schemas from its children alone.
    ///
    /// Leaves return their declared schemas unchanged.
    pub fn rederive(&self) -> Result<DerivedSchemas> {
        match &self.0.kind {
            OperatorKind::Individual(_) => Ok(self.0.schemas.clone()),
            OperatorKind::Sequential(steps) => algebra::derive_sequential(steps),
            OperatorKind::Choice(branches) => algebra::derive_choice(branches),
            OperatorKind::Parallel(branches) => algebra::derive_parallel(branches),
        }
    }

    /// Validate hyperparameters against this operator's schema
    pub fn validate_hyperparameters(&self, hyperparams: &Value, origin: ValidationOrigin) -> Result<()> {
        checker::validate(hyperparams, self.hyperparameter_schema()).map_err(|error| {
            ComposeError::HyperparameterValidation {
                operator: self.name().to_string(),
                origin,
                error,
            }
        })
    }

    /// Validate user-supplied hyperparameters, then configure the implementation.
    ///
    /// Returns the configured handle for leaves that wrap one, `None` otherwise.
    pub fn configure(&self, hyperparams: &Value) -> Result<Option<Arc<dyn Implementation>>> {
        self.validate_hyperparameters(hyperparams, ValidationOrigin::User)?;
        self.implementation()
            .map(|implementation| implementation.configure(hyperparams))
            .transpose()
    }

    fn fmt_child(&self, child: &Operator, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Children bind tighter than the parent combinator unless they are leaves
        let needs_parens = !child.is_individual() && child.precedence() <= self.precedence();
        if needs_parens {
            write!(f, "({})", child)
        } else {
            write!(f, "{}", child)
        }
    }

    fn precedence(&self) -> u8 {
        match self.0.kind {
            OperatorKind::Choice(_) => 1,
            OperatorKind::Parallel(_) => 2,
            OperatorKind::Sequential(_) => 3,
            OperatorKind::Individual(_) => 4,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = match &self.0.kind {
            OperatorKind::Individual(_) => return write!(f, "{}", self.0.name),
            OperatorKind::Sequential(_) => " >> ",
            OperatorKind::Choice(_) => " | ",
            OperatorKind::Parallel(_) => " & ",
        };
        for (i, child) in self.children().iter().enumerate() {
            if i > 0 {
                f.write_str(separator)?;
            }
            self.fmt_child(child, f)?;
        }
        Ok(())
    }
}

/// Builder for leaf operators
#[derive(Debug)]
pub struct OperatorBuilder {
    name: String,
    input: Schema,
    output: Schema,
    hyperparameters: Schema,
    implementation: Option<Arc<dyn Implementation>>,
}

impl OperatorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Schema::Any,
            output: Schema::Any,
            hyperparameters: Schema::object(crate::schema::ObjectSchema::new().closed()),
            implementation: None,
        }
    }

    pub fn input(mut self, schema: Schema) -> Self {
        self.input = schema;
        self
    }

    pub fn output(mut self, schema: Schema) -> Self {
        self.output = schema;
        self
    }

    pub fn hyperparameters(mut self, schema: Schema) -> Self {
        self.hyperparameters = schema;
        self
    }

    pub fn implementation(mut self, implementation: Arc<dyn Implementation>) -> Self {
        self.implementation = Some(implementation);
        self
    }

    /// Check every schema for well-formedness and build the operator
    pub fn build(self) -> Result<Operator> {
        if self.name.is_empty() {
            return Err(ComposeError::ConfigError("operator name must not be empty".to_string()));
        }
        self.input.check_well_formed()?;
        self.output.check_well_formed()?;
        self.hyperparameters.check_well_formed()?;
        Ok(Operator::composite(
            self.name,
            OperatorKind::Individual(self.implementation),
            DerivedSchemas {
                input: self.input,
                output: self.output,
                hyperparameters: self.hyperparameters,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObjectSchema;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Recorder {
        configured: Mutex<Vec<Value>>,
    }

    impl Implementation for Recorder {
        fn configure(&self, hyperparams: &Value) -> Result<Arc<dyn Implementation>> {
            self.configured.lock().push(hyperparams.clone());
            Ok(Arc::new(Recorder::default()))
        }

        fn fit(&self, _x: &Value, _y: Option<&Value>) -> Result<Arc<dyn Implementation>> {
            Ok(Arc::new(Recorder::default()))
        }

        fn predict(&self, x: &Value) -> Result<Value> {
            Ok(x.clone())
        }
    }

    fn knn(implementation: Arc<Recorder>) -> Operator {
        Operator::individual("KNN")
            .hyperparameters(Schema::object(
                ObjectSchema::new()
                    .required("k", Schema::integer_range(1, 50))
                    .closed(),
            ))
            .implementation(implementation)
            .build()
            .unwrap()
    }

    #[test]
    fn test_configure_validates_first() {
        let recorder = Arc::new(Recorder::default());
        let op = knn(recorder.clone());

        assert!(op.configure(&json!({"k": 5})).unwrap().is_some());
        let err = op.configure(&json!({"k": 0})).unwrap_err();
        match err {
            ComposeError::HyperparameterValidation { operator, origin, error } => {
                assert_eq!(operator, "KNN");
                assert_eq!(origin, ValidationOrigin::User);
                assert_eq!(error.path.to_string(), "k");
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert_eq!(recorder.configured.lock().len(), 1);
    }

    #[test]
    fn test_build_rejects_malformed_schema() {
        let mut object = ObjectSchema::new();
        object.required.insert("missing".to_string());
        let result = Operator::individual("Broken")
            .hyperparameters(Schema::object(object))
            .build();
        assert!(matches!(result, Err(ComposeError::SchemaMalformed { .. })));
    }

    #[test]
    fn test_leaf_properties() {
        let op = Operator::individual("PCA").build().unwrap();
        assert_eq!(op.depth(), 0);
        assert_eq!(op.leaf_count(), 1);
        assert_eq!(op.to_string(), "PCA");
        assert!(op.children().is_empty());
        assert_eq!(op.rederive().unwrap(), op.schemas().clone());

        let clone = op.clone();
        assert!(clone.ptr_eq(&op));
        let renamed = op.renamed("PCA2");
        assert_eq!(renamed.name(), "PCA2");
        assert!(!renamed.ptr_eq(&op));
    }
}

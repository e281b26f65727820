//! Operator registry

use super::{Operator, PipelineDescription};
use crate::algebra;
use crate::error::{ComposeError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Leaf operators by name, used to rebuild pipelines from descriptions
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    operators: BTreeMap<String, Operator>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator under its own name
    pub fn register(&mut self, operator: Operator) -> Result<()> {
        let name = operator.name().to_string();
        if self.operators.contains_key(&name) {
            return Err(ComposeError::DuplicateOperator(name));
        }
        debug!(operator = %name, "Registered operator");
        self.operators.insert(name, operator);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, operator: Operator) -> Result<Self> {
        self.register(operator)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&Operator> {
        self.operators
            .get(name)
            .ok_or_else(|| ComposeError::OperatorNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Rebuild a pipeline, type-checking every edge again
    pub fn reconstruct(&self, description: &PipelineDescription) -> Result<Operator> {
        let build = |children: &[PipelineDescription]| -> Result<Vec<Operator>> {
            children.iter().map(|c| self.reconstruct(c)).collect()
        };
        let (operator, name) = match description {
            PipelineDescription::Operator { name } => return Ok(self.get(name)?.clone()),
            PipelineDescription::Sequential { name, steps } => {
                (algebra::sequential(build(steps)?)?, name)
            }
            PipelineDescription::Choice { name, branches } => {
                (algebra::choice(build(branches)?)?, name)
            }
            PipelineDescription::Parallel { name, branches } => {
                (algebra::parallel(build(branches)?)?, name)
            }
        };
        Ok(match name {
            Some(name) => operator.renamed(name.clone()),
            None => operator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ObjectSchema, Schema};

    fn leaf(name: &str) -> Operator {
        Operator::individual(name)
            .input(Schema::object(ObjectSchema::new()))
            .output(Schema::object(ObjectSchema::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = OperatorRegistry::new();
        registry.register(leaf("Scale")).unwrap();
        assert!(registry.contains("Scale"));
        assert!(matches!(
            registry.register(leaf("Scale")),
            Err(ComposeError::DuplicateOperator(_))
        ));
        assert!(matches!(registry.get("PCA"), Err(ComposeError::OperatorNotFound(_))));
    }

    #[test]
    fn test_reconstruct_roundtrip() {
        let registry = OperatorRegistry::new()
            .with(leaf("Scale"))
            .and_then(|r| r.with(leaf("KNN")))
            .and_then(|r| r.with(leaf("LR")))
            .unwrap();
        let pipeline = registry.get("Scale").unwrap().then(
            &registry.get("KNN").unwrap().or(registry.get("LR").unwrap()).unwrap(),
        ).unwrap();

        let rebuilt = registry.reconstruct(&pipeline.describe()).unwrap();
        assert_eq!(rebuilt.to_string(), pipeline.to_string());
        assert_eq!(rebuilt.schemas(), pipeline.schemas());
    }

    #[test]
    fn test_reconstruct_unknown_leaf() {
        let registry = OperatorRegistry::new();
        let err = registry
            .reconstruct(&PipelineDescription::operator("Ghost"))
            .unwrap_err();
        assert!(matches!(err, ComposeError::OperatorNotFound(name) if name == "Ghost"));
    }
}

//! Structural pipeline descriptions

use super::{Operator, OperatorKind};
use serde::{Deserialize, Serialize};

/// Serializable shape of a pipeline, naming leaves by their registered name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineDescription {
    Operator {
        name: String,
    },
    Sequential {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        steps: Vec<PipelineDescription>,
    },
    Choice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        branches: Vec<PipelineDescription>,
    },
    Parallel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        branches: Vec<PipelineDescription>,
    },
}

impl PipelineDescription {
    pub fn operator(name: impl Into<String>) -> Self {
        PipelineDescription::Operator { name: name.into() }
    }

    pub fn sequential(steps: Vec<PipelineDescription>) -> Self {
        PipelineDescription::Sequential { name: None, steps }
    }

    pub fn choice(branches: Vec<PipelineDescription>) -> Self {
        PipelineDescription::Choice { name: None, branches }
    }

    pub fn parallel(branches: Vec<PipelineDescription>) -> Self {
        PipelineDescription::Parallel { name: None, branches }
    }

    /// Names of every leaf operator referenced, in order of appearance
    pub fn leaf_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                PipelineDescription::Operator { name } => names.push(name.as_str()),
                PipelineDescription::Sequential { steps: children, .. }
                | PipelineDescription::Choice { branches: children, .. }
                | PipelineDescription::Parallel { branches: children, .. } => {
                    stack.extend(children.iter().rev());
                }
            }
        }
        names
    }
}

impl Operator {
    /// Describe this operator's combinator tree.
    ///
    /// Composite names are kept only when they differ from the combinator's default.
    pub fn describe(&self) -> PipelineDescription {
        let children = || -> Vec<PipelineDescription> { self.children().iter().map(Operator::describe).collect() };
        let name = |default: &str| (self.name() != default).then(|| self.name().to_string());
        match self.kind() {
            OperatorKind::Individual(_) => PipelineDescription::operator(self.name()),
            OperatorKind::Sequential(_) => PipelineDescription::Sequential {
                name: name(crate::algebra::SEQUENTIAL_NAME),
                steps: children(),
            },
            OperatorKind::Choice(_) => PipelineDescription::Choice {
                name: name(crate::algebra::CHOICE_NAME),
                branches: children(),
            },
            OperatorKind::Parallel(_) => PipelineDescription::Parallel {
                name: name(crate::algebra::PARALLEL_NAME),
                branches: children(),
            },
        }
    }
}

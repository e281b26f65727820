//! Kolosal Compose - Typed ML pipeline composition
//!
//! This crate provides the composition layer of an AutoML system:
//! - Structural schemas for operator inputs, outputs and hyperparameters
//! - A subsumption type checker deciding whether one operator may feed another
//! - Pipeline combinators (sequential `>>`, choice `|`, parallel `&`) that derive
//!   the schemas of a composite from its children
//! - Compilation of hyperparameter schemas into optimizer search spaces, and
//!   validation of optimizer samples on the way back
//! - Grammars that enumerate or sample well-typed pipelines
//!
//! # Modules
//!
//! - [`schema`] - Schema model, JSON loading and merging
//! - [`checker`] - Subsumption and value validation
//! - [`operator`] - Operators, pipeline descriptions and the operator registry
//! - [`algebra`] - Pipeline combinators
//! - [`search_space`] - Search-space compilation, sampling and grids
//! - [`grammar`] - Pipeline grammars
//! - [`config`] - Aggregate configuration
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```
//! use kolosal_compose::prelude::*;
//!
//! let table = Schema::object(ObjectSchema::new().required("X", Schema::array_of(Schema::number())));
//! let scale = Operator::individual("Scale").input(table.clone()).output(table.clone()).build()?;
//! let knn = Operator::individual("KNN")
//!     .input(table)
//!     .output(Schema::array_of(Schema::integer()))
//!     .hyperparameters(Schema::object(
//!         ObjectSchema::new().required("k", Schema::integer_range(1, 50)).closed(),
//!     ))
//!     .build()?;
//!
//! let pipeline = scale.then(&knn)?;
//! assert_eq!(pipeline.to_string(), "Scale >> KNN");
//!
//! let space = SearchSpaceCompiler::default().compile_operator(&pipeline)?;
//! assert_eq!(space.param_names(), vec!["KNN.k"]);
//! # Ok::<(), kolosal_compose::ComposeError>(())
//! ```

// Core error handling
pub mod error;

// Schema model and type checking
pub mod schema;
pub mod checker;

// Composition
pub mod operator;
pub mod algebra;
pub mod grammar;

// Hyperparameter optimization support
pub mod search_space;

// Configuration and services
pub mod config;
pub mod cli;

pub use error::{ComposeError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ComposeError, Result, ValidationError, ValidationOrigin};

    // Schemas
    pub use crate::schema::{ArraySchema, ObjectSchema, ScalarKind, ScalarSchema, Schema, SchemaPath};
    pub use crate::checker::{check_subsumption, is_subsumed_by, validate};

    // Operators and combinators
    pub use crate::operator::{Implementation, Operator, OperatorRegistry, PipelineDescription};
    pub use crate::algebra::{choice, parallel, sequential, Combinator};

    // Search spaces
    pub use crate::search_space::{
        CompilerConfig, KeepGrids, Parameter, ParameterType, ParameterValue, SearchSpace, SearchSpaceCompiler,
        TrialParams,
    };

    // Grammars
    pub use crate::grammar::{Expansion, ExpansionConfig, Expr, Grammar};

    // Configuration
    pub use crate::config::ComposeConfig;
}

//! Error types for Kolosal Compose

use crate::schema::{Schema, SchemaPath};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for composition operations
pub type Result<T> = std::result::Result<T, ComposeError>;

/// Where a rejected hyperparameter configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOrigin {
    /// A literal configuration written by the user
    User,
    /// An optimizer sample outside the declared search-space domains.
    /// Indicates a compiler bug or an optimizer ignoring its domains.
    Optimizer,
    /// An optimizer sample inside its domains that breaks a cross-parameter constraint
    Constraint,
}

impl fmt::Display for ValidationOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationOrigin::User => write!(f, "user error"),
            ValidationOrigin::Optimizer => write!(f, "optimizer contract violation"),
            ValidationOrigin::Constraint => write!(f, "constraint violation"),
        }
    }
}

/// A concrete value failed to satisfy a schema
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{path}: {reason}")]
pub struct ValidationError {
    pub path: SchemaPath,
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: SchemaPath, reason: impl Into<String>) -> Self {
        Self {
            path,
            reason: reason.into(),
        }
    }
}

/// Main error type for the composition framework
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Malformed schema at {path}: {reason}")]
    SchemaMalformed { path: SchemaPath, reason: String },

    #[error("Type mismatch at {path}: {reason} (producer: {producer}, consumer: {consumer})")]
    TypeMismatch {
        path: SchemaPath,
        reason: String,
        producer: Box<Schema>,
        consumer: Box<Schema>,
    },

    #[error("Hyperparameter validation failed for {operator} ({origin}): {error}")]
    HyperparameterValidation {
        operator: String,
        origin: ValidationOrigin,
        error: ValidationError,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(#[from] ValidationError),

    #[error("Unbounded domain at {path}: {reason}")]
    UnboundedDomain { path: SchemaPath, reason: String },

    #[error("Grammar expansion error: {0}")]
    GrammarExpansion(String),

    #[error("Unbounded recursion: nonterminal '{nonterminal}' is reachable from itself and no depth bound was given")]
    UnboundedRecursion { nonterminal: String },

    #[error("Empty composition: {0}")]
    EmptyComposition(String),

    #[error("Operator not found: {0}")]
    OperatorNotFound(String),

    #[error("Duplicate operator: {0}")]
    DuplicateOperator(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ComposeError {
    pub(crate) fn malformed(path: &SchemaPath, reason: impl Into<String>) -> Self {
        ComposeError::SchemaMalformed {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(
        path: &SchemaPath,
        reason: impl Into<String>,
        producer: &Schema,
        consumer: &Schema,
    ) -> Self {
        ComposeError::TypeMismatch {
            path: path.clone(),
            reason: reason.into(),
            producer: Box::new(producer.clone()),
            consumer: Box::new(consumer.clone()),
        }
    }

    /// Schema path carried by this error, if any
    pub fn path(&self) -> Option<&SchemaPath> {
        match self {
            ComposeError::SchemaMalformed { path, .. }
            | ComposeError::TypeMismatch { path, .. }
            | ComposeError::UnboundedDomain { path, .. } => Some(path),
            ComposeError::HyperparameterValidation { error, .. } => Some(&error.path),
            ComposeError::InvalidValue(error) => Some(&error.path),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ComposeError {
    fn from(err: serde_json::Error) -> Self {
        ComposeError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ComposeError::GrammarExpansion("no production".to_string());
        assert_eq!(err.to_string(), "Grammar expansion error: no production");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ComposeError = io_err.into();
        assert!(matches!(err, ComposeError::IoError(_)));
    }

    #[test]
    fn test_validation_error_path() {
        let err = ComposeError::HyperparameterValidation {
            operator: "Classify".to_string(),
            origin: ValidationOrigin::Optimizer,
            error: ValidationError::new(SchemaPath::root().property("k"), "below minimum 1"),
        };
        assert_eq!(err.path().map(|p| p.to_string()), Some("k".to_string()));
        assert!(err.to_string().contains("optimizer contract violation"));
    }
}

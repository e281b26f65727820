//! Type checking
//!
//! Two questions are answered here: whether a concrete value satisfies a schema
//! ([`validate`]) and whether every value of one schema satisfies another
//! ([`is_subsumed_by`]). The pipeline algebra asks the second question on every
//! composition edge. [`are_disjoint`] tells the search-space compiler whether
//! the branches of a `oneOf` can be sampled independently.

mod disjoint;
mod subsume;
mod validate;

pub use disjoint::are_disjoint;
pub use subsume::{check_subsumption, is_subsumed_by};
pub use validate::{validate, validate_at};

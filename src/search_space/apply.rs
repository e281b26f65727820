//! Turning optimizer samples back into hyperparameters

use super::{set_at, ParameterType, SearchSpace, TrialParams};
use crate::checker::validate;
use crate::error::{ComposeError, Result, ValidationError, ValidationOrigin};
use crate::schema::SchemaPath;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

impl SearchSpace {
    /// Build the nested hyperparameter value for one optimizer sample.
    ///
    /// Conditional dimensions pick the branch whose dimensions are read; keys of
    /// inactive branches are ignored, keys unknown to the space are rejected.
    /// The result is validated against the domain schema, where a failure is an
    /// [`ValidationOrigin::Optimizer`] contract violation, then against the full
    /// schema, where a failure is a [`ValidationOrigin::Constraint`] rejection.
    ///
    /// Takes `&self` only, so trials may be applied concurrently.
    pub fn apply(&self, sample: &TrialParams) -> Result<Value> {
        let mut value = self.skeleton.clone().unwrap_or(Value::Null);
        let mut consumed = HashSet::new();
        self.fill(sample, &mut value, &mut consumed)?;

        let unconsumed: Vec<&String> = sample.keys().filter(|k| !consumed.contains(k.as_str())).collect();
        if !unconsumed.is_empty() {
            let known: HashSet<&str> = self.all_parameters().into_iter().map(|p| p.name.as_str()).collect();
            for key in unconsumed {
                if known.contains(key.as_str()) {
                    debug!(space = %self.name, key = %key, "Ignoring dimension of inactive branch");
                } else {
                    return Err(self.rejection(
                        ValidationOrigin::Optimizer,
                        ValidationError::new(
                            SchemaPath::parse(key).unwrap_or_default(),
                            format!("'{}' is not a dimension of this search space", key),
                        ),
                    ));
                }
            }
        }

        validate(&value, &self.domain).map_err(|e| self.rejection(ValidationOrigin::Optimizer, e))?;
        validate(&value, &self.schema).map_err(|e| self.rejection(ValidationOrigin::Constraint, e))?;
        Ok(value)
    }

    fn fill<'a>(&self, sample: &'a TrialParams, target: &mut Value, consumed: &mut HashSet<&'a str>) -> Result<()> {
        for param in &self.parameters {
            let Some((key, chosen)) = sample.get_key_value(&param.name) else {
                // Missing values surface as validation errors
                if param.is_conditional() {
                    return Err(self.rejection(
                        ValidationOrigin::Optimizer,
                        ValidationError::new(param.path.clone(), format!("selector '{}' is missing", param.name)),
                    ));
                }
                continue;
            };
            consumed.insert(key.as_str());
            match &param.param_type {
                ParameterType::Conditional { branches } => {
                    let branch = chosen
                        .as_string()
                        .and_then(|label| branches.iter().find(|b| b.label == label))
                        .ok_or_else(|| {
                            let labels: Vec<&str> = branches.iter().map(|b| b.label.as_str()).collect();
                            self.rejection(
                                ValidationOrigin::Optimizer,
                                ValidationError::new(
                                    param.path.clone(),
                                    format!("{} is not one of the branches {:?}", chosen, labels),
                                ),
                            )
                        })?;
                    if let Some(skeleton) = &branch.space.skeleton {
                        set_at(target, param.path.segments(), skeleton.clone());
                    }
                    branch.space.fill(sample, target, consumed)?;
                }
                _ => set_at(target, param.path.segments(), chosen.to_value()),
            }
        }
        Ok(())
    }

    fn rejection(&self, origin: ValidationOrigin, error: ValidationError) -> ComposeError {
        ComposeError::HyperparameterValidation {
            operator: self.name.clone(),
            origin,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{ComposeError, ValidationOrigin};
    use crate::schema::{ObjectSchema, Schema};
    use crate::search_space::{CompilerConfig, ParameterValue, SearchSpaceCompiler, TrialParams};
    use serde_json::json;

    fn classify() -> Schema {
        Schema::object(
            ObjectSchema::new()
                .required("k", Schema::integer_range(1, 50))
                .required("weights", Schema::enumeration(vec![json!("uniform"), json!("distance")]))
                .closed(),
        )
    }

    fn params(entries: &[(&str, ParameterValue)]) -> TrialParams {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_apply_nests_values() {
        let compiler = SearchSpaceCompiler::new(CompilerConfig::default());
        let space = compiler.compile(&classify()).unwrap();
        let value = space
            .apply(&params(&[
                ("k", ParameterValue::Int(7)),
                ("weights", ParameterValue::String("distance".to_string())),
            ]))
            .unwrap();
        assert_eq!(value, json!({"k": 7, "weights": "distance"}));
    }

    #[test]
    fn test_out_of_domain_is_optimizer_violation() {
        let compiler = SearchSpaceCompiler::new(CompilerConfig::default());
        let space = compiler.compile(&classify()).unwrap();
        let err = space
            .apply(&params(&[
                ("k", ParameterValue::Int(0)),
                ("weights", ParameterValue::String("uniform".to_string())),
            ]))
            .unwrap_err();
        match err {
            ComposeError::HyperparameterValidation { origin, error, .. } => {
                assert_eq!(origin, ValidationOrigin::Optimizer);
                assert_eq!(error.path.to_string(), "k");
            }
            other => panic!("Expected validation error, got {:?}", other),
        }

        let err = space
            .apply(&params(&[("k", ParameterValue::Int(3)), ("p", ParameterValue::Int(2))]))
            .unwrap_err();
        assert!(err.to_string().contains("not a dimension"));
    }

    #[test]
    fn test_constraint_violation_is_distinct() {
        // solver "lbfgs" only supports penalty "l2"
        let main = Schema::object(
            ObjectSchema::new()
                .required("solver", Schema::enumeration(vec![json!("lbfgs"), json!("saga")]))
                .required("penalty", Schema::enumeration(vec![json!("l1"), json!("l2")])),
        );
        let constraint = Schema::any_of(vec![
            Schema::object(ObjectSchema::new().required("solver", Schema::enumeration(vec![json!("saga")]))),
            Schema::object(ObjectSchema::new().required("penalty", Schema::enumeration(vec![json!("l2")]))),
        ]);
        let schema = Schema::all_of(vec![main, constraint]);
        let compiler = SearchSpaceCompiler::new(CompilerConfig::default());
        let space = compiler.compile(&schema).unwrap();
        assert_eq!(space.param_names(), vec!["penalty", "solver"]);

        let ok = space.apply(&params(&[
            ("solver", ParameterValue::String("lbfgs".to_string())),
            ("penalty", ParameterValue::String("l2".to_string())),
        ]));
        assert!(ok.is_ok());

        let err = space
            .apply(&params(&[
                ("solver", ParameterValue::String("lbfgs".to_string())),
                ("penalty", ParameterValue::String("l1".to_string())),
            ]))
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::HyperparameterValidation { origin: ValidationOrigin::Constraint, .. }
        ));
    }

    #[test]
    fn test_conditional_selection() {
        let schema = Schema::one_of(vec![
            Schema::object(ObjectSchema::new().required("KNN", classify()).closed()),
            Schema::object(
                ObjectSchema::new()
                    .required(
                        "LR",
                        Schema::object(ObjectSchema::new().required("C", Schema::number_range(0.1, 10.0)).closed()),
                    )
                    .closed(),
            ),
        ]);
        let compiler = SearchSpaceCompiler::new(CompilerConfig::default());
        let space = compiler.compile(&schema).unwrap();

        let value = space
            .apply(&params(&[
                ("choice", ParameterValue::String("LR".to_string())),
                ("LR.C", ParameterValue::Float(1.0)),
                // inactive branch keys are ignored
                ("KNN.k", ParameterValue::Int(3)),
            ]))
            .unwrap();
        assert_eq!(value, json!({"LR": {"C": 1.0}}));

        let err = space
            .apply(&params(&[("choice", ParameterValue::String("SVM".to_string()))]))
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::HyperparameterValidation { origin: ValidationOrigin::Optimizer, .. }
        ));
        assert!(space.apply(&TrialParams::new()).is_err());
    }
}

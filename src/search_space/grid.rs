//! Grid enumeration over a search space

use super::{CompilerConfig, KeepGrids, Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
use crate::error::Result;
use tracing::{debug, warn};

/// One combination of conditional-branch selections and the plain dimensions it activates
#[derive(Debug, Clone)]
pub struct Grid<'a> {
    /// Selector name and chosen branch label
    pub selections: Vec<(String, String)>,
    pub parameters: Vec<&'a Parameter>,
}

impl<'a> Grid<'a> {
    fn empty() -> Self {
        Self {
            selections: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Number of points this grid enumerates at `points` per numeric dimension
    pub fn size(&self, points: usize) -> usize {
        self.parameters
            .iter()
            .map(|p| grid_points(p, points).len())
            .fold(1usize, |acc, n| acc.saturating_mul(n))
    }
}

impl SearchSpace {
    /// Number of combinations of conditional branches, saturating at `usize::MAX`
    pub fn grid_count(&self) -> usize {
        self.parameters
            .iter()
            .fold(1usize, |acc, param| acc.saturating_mul(selector_count(param)))
    }

    /// Every combination of conditional branches, produced on demand
    pub fn grids(&self) -> impl Iterator<Item = Grid<'_>> + '_ {
        (0..self.grid_count()).map(move |index| self.grid_at(index))
    }

    /// The combination at `index`; earlier selectors vary slowest
    pub fn grid_at(&self, index: usize) -> Grid<'_> {
        let mut grid = Grid::empty();
        self.decode_grid(index, &mut grid);
        grid
    }

    fn decode_grid<'a>(&'a self, mut index: usize, grid: &mut Grid<'a>) {
        let counts: Vec<usize> = self.parameters.iter().map(selector_count).collect();
        for (i, param) in self.parameters.iter().enumerate() {
            let ParameterType::Conditional { branches } = &param.param_type else {
                grid.parameters.push(param);
                continue;
            };
            let stride = counts[i + 1..].iter().fold(1usize, |acc, n| acc.saturating_mul(*n));
            let mut digit = index / stride;
            index %= stride;
            for (b, branch) in branches.iter().enumerate() {
                let n = branch.space.grid_count();
                if digit < n || b + 1 == branches.len() {
                    grid.selections.push((param.name.clone(), branch.label.clone()));
                    branch.space.decode_grid(digit, grid);
                    break;
                }
                digit -= n;
            }
        }
    }

    /// Enumerate grid configurations.
    ///
    /// Numeric dimensions contribute `grid_points` evenly spaced values (log-spaced
    /// when log-scaled), categoricals all their choices. `keep_grids` keeps an
    /// evenly strided subset of the branch combinations; the total is capped at
    /// `max_grid_size`. Combinations are decoded one at a time, so the cap bounds
    /// the work as well as the result.
    pub fn grid(&self, config: &CompilerConfig) -> Result<Vec<TrialParams>> {
        config.validate()?;
        let total = self.grid_count();
        let kept = kept_count(total, config.keep_grids);

        let mut configurations = Vec::new();
        let mut truncated = false;
        for i in 0..kept {
            let remaining = config.max_grid_size - configurations.len();
            if remaining == 0 {
                truncated = true;
                break;
            }
            let grid = self.grid_at(strided(i, kept, total));
            if grid.size(config.grid_points) > remaining {
                truncated = true;
            }

            let mut partial: Vec<TrialParams> = vec![grid
                .selections
                .iter()
                .map(|(name, label)| (name.clone(), ParameterValue::String(label.clone())))
                .collect()];
            for param in &grid.parameters {
                let values = grid_points(param, config.grid_points);
                partial = partial
                    .into_iter()
                    .flat_map(|params| {
                        values.iter().map(move |value| {
                            let mut next = params.clone();
                            next.insert(param.name.clone(), value.clone());
                            next
                        })
                    })
                    .take(remaining)
                    .collect();
            }
            configurations.extend(partial);
        }
        if truncated {
            warn!(
                space = %self.name,
                grids = total,
                cap = config.max_grid_size,
                "Grid truncated at max_grid_size"
            );
        }
        debug!(space = %self.name, grids = kept, points = configurations.len(), "Enumerated grid");
        Ok(configurations)
    }
}

/// Branch combinations a selector contributes
fn selector_count(param: &Parameter) -> usize {
    match &param.param_type {
        ParameterType::Conditional { branches } => branches
            .iter()
            .fold(0usize, |acc, branch| acc.saturating_add(branch.space.grid_count())),
        _ => 1,
    }
}

/// How many of `total` grids `keep_grids` selects
fn kept_count(total: usize, keep_grids: Option<KeepGrids>) -> usize {
    let k = match keep_grids {
        None => return total,
        Some(KeepGrids::Fraction(f)) => ((f * total as f64).ceil() as usize).max(1),
        Some(KeepGrids::Count(c)) => c,
    };
    k.min(total)
}

/// Index of the `i`-th of `kept` evenly strided grids out of `total`
fn strided(i: usize, kept: usize, total: usize) -> usize {
    if kept == total {
        return i;
    }
    (i as u128 * total as u128 / kept as u128) as usize
}

/// Grid values of one plain dimension
fn grid_points(param: &Parameter, points: usize) -> Vec<ParameterValue> {
    match &param.param_type {
        ParameterType::Float { low, high, log_scale } => spaced(*low, *high, *log_scale, points)
            .into_iter()
            .map(ParameterValue::Float)
            .collect(),
        ParameterType::Int { low, high, log_scale } => {
            let span = (high - low) as u64 + 1;
            if span <= points as u64 {
                return (*low..=*high).map(ParameterValue::Int).collect();
            }
            let mut values: Vec<i64> = spaced(*low as f64, *high as f64, *log_scale, points)
                .into_iter()
                .map(|v| (v.round() as i64).clamp(*low, *high))
                .collect();
            values.dedup();
            values.into_iter().map(ParameterValue::Int).collect()
        }
        ParameterType::Categorical { choices } => choices.clone(),
        ParameterType::Boolean => vec![ParameterValue::Bool(false), ParameterValue::Bool(true)],
        ParameterType::Conditional { .. } => Vec::new(),
    }
}

fn spaced(low: f64, high: f64, log_scale: bool, points: usize) -> Vec<f64> {
    if points <= 1 {
        return vec![low];
    }
    let (from, to) = if log_scale { (low.ln(), high.ln()) } else { (low, high) };
    let step = (to - from) / (points - 1) as f64;
    (0..points)
        .map(|i| {
            let v = if i == points - 1 { to } else { from + step * i as f64 };
            let v = if log_scale { v.exp() } else { v };
            v.clamp(low, high)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ObjectSchema, ScalarKind, ScalarSchema, Schema};
    use crate::search_space::SearchSpaceCompiler;

    fn choice_schema() -> Schema {
        Schema::one_of(vec![
            Schema::object(
                ObjectSchema::new()
                    .required("KNN", Schema::object(ObjectSchema::new().required("k", Schema::integer_range(1, 3))))
                    .closed(),
            ),
            Schema::object(
                ObjectSchema::new()
                    .required(
                        "LR",
                        Schema::object(
                            ObjectSchema::new()
                                .required("C", Schema::number_range(0.0, 1.0))
                                .required("fit_intercept", Schema::boolean()),
                        ),
                    )
                    .closed(),
            ),
        ])
    }

    #[test]
    fn test_grids_follow_branches() {
        let compiler = SearchSpaceCompiler::default();
        let space = compiler.compile(&choice_schema()).unwrap();
        assert_eq!(space.grid_count(), 2);
        let grids: Vec<Grid<'_>> = space.grids().collect();
        assert_eq!(grids.len(), 2);
        assert_eq!(grids[0].selections, vec![("choice".to_string(), "KNN".to_string())]);
        assert_eq!(grids[0].size(5), 3);
        assert_eq!(grids[1].size(5), 10);
    }

    #[test]
    fn test_grid_points_apply() {
        let compiler = SearchSpaceCompiler::default();
        let space = compiler.compile(&choice_schema()).unwrap();
        let configurations = space.grid(&CompilerConfig::default()).unwrap();
        assert_eq!(configurations.len(), 13);
        for params in &configurations {
            assert!(space.apply(params).is_ok(), "rejected {:?}", params);
        }
    }

    #[test]
    fn test_keep_grids_and_cap() {
        let compiler = SearchSpaceCompiler::default();
        let space = compiler.compile(&choice_schema()).unwrap();

        let config = CompilerConfig::new().with_keep_grids(KeepGrids::Count(1));
        let kept = space.grid(&config).unwrap();
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|p| p["choice"] == ParameterValue::String("KNN".to_string())));

        let config = CompilerConfig::new().with_max_grid_size(4);
        assert_eq!(space.grid(&config).unwrap().len(), 4);
    }

    #[test]
    fn test_many_choices_stay_within_cap() {
        // 18 two-way choices give 2^18 branch combinations of one point each
        let mut object = ObjectSchema::new();
        for i in 0..18 {
            let branch = |key: &str| {
                Schema::object(ObjectSchema::new().required(key, Schema::integer_range(1, 1)).closed())
            };
            object = object.required(format!("step{:02}", i), Schema::one_of(vec![branch("a"), branch("b")]));
        }
        let compiler = SearchSpaceCompiler::default();
        let space = compiler.compile(&Schema::object(object.closed())).unwrap();
        assert_eq!(space.grid_count(), 1 << 18);

        let last = space.grid_at((1 << 18) - 1);
        assert_eq!(last.selections.len(), 18);
        assert!(last.selections.iter().all(|(_, label)| label == "b"));

        let config = CompilerConfig::new().with_max_grid_size(10);
        let configurations = space.grid(&config).unwrap();
        assert_eq!(configurations.len(), 10);
        for params in &configurations {
            assert!(space.apply(params).is_ok(), "rejected {:?}", params);
        }

        let config = CompilerConfig::new().with_keep_grids(KeepGrids::Count(4));
        let configurations = space.grid(&config).unwrap();
        assert_eq!(configurations.len(), 4);
        assert_eq!(configurations[0]["step01"], ParameterValue::String("a".to_string()));
        assert_eq!(configurations[1]["step00"], ParameterValue::String("a".to_string()));
        assert_eq!(configurations[1]["step01"], ParameterValue::String("b".to_string()));
    }

    #[test]
    fn test_log_spaced_points() {
        let schema = Schema::object(ObjectSchema::new().required(
            "alpha",
            Schema::scalar(
                ScalarSchema::new(ScalarKind::Number)
                    .with_minimum(1e-4)
                    .with_maximum(1.0)
                    .log_uniform(),
            ),
        ));
        let compiler = SearchSpaceCompiler::default();
        let space = compiler.compile(&schema).unwrap();
        let values: Vec<f64> = space
            .grid(&CompilerConfig::new().with_grid_points(5))
            .unwrap()
            .iter()
            .filter_map(|p| p["alpha"].as_float())
            .collect();
        assert_eq!(values.len(), 5);
        assert!((values[0] - 1e-4).abs() < 1e-12);
        assert!((values[2] - 1e-2).abs() < 1e-9);
        assert_eq!(values[4], 1.0);
    }
}

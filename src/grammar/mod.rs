//! Pipeline grammars
//!
//! A [`Grammar`] maps nonterminal names to ordered productions. A production is
//! an [`Expr`] over terminal operators, nonterminal references and the three
//! combinators. Expanding the start symbol enumerates candidate pipelines,
//! each type-checked by the algebra as it is assembled.
//!
//! ```text
//! start      ::= preprocess >> estimator
//! preprocess ::= Scale | PCA | (Scale >> PCA)
//! estimator  ::= KNN | LR
//! ```
//!
//! Recursive grammars are legal; they need a depth bound, which also bounds the
//! work an enumeration can do.

mod expand;

pub use expand::{Expansion, ExpansionStats};

use crate::error::{ComposeError, Result};
use crate::operator::Operator;
use expand::{instantiate, sample_once, Failure, Node};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

/// Right-hand side of a production
#[derive(Debug, Clone)]
pub enum Expr {
    Terminal(Operator),
    NonTerminal(String),
    Sequential(Vec<Expr>),
    Choice(Vec<Expr>),
    Parallel(Vec<Expr>),
}

impl Expr {
    pub fn terminal(op: &Operator) -> Self {
        Expr::Terminal(op.clone())
    }

    pub fn nt(name: impl Into<String>) -> Self {
        Expr::NonTerminal(name.into())
    }

    pub fn seq(children: Vec<Expr>) -> Self {
        Expr::Sequential(children)
    }

    pub fn choice(children: Vec<Expr>) -> Self {
        Expr::Choice(children)
    }

    pub fn par(children: Vec<Expr>) -> Self {
        Expr::Parallel(children)
    }

    /// Nonterminals referenced anywhere in the expression
    pub fn references(&self) -> Vec<&str> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Terminal(_) => {}
                Expr::NonTerminal(name) => found.push(name.as_str()),
                Expr::Sequential(children) | Expr::Choice(children) | Expr::Parallel(children) => {
                    stack.extend(children.iter().rev());
                }
            }
        }
        found
    }
}

impl From<Operator> for Expr {
    fn from(op: Operator) -> Self {
        Expr::Terminal(op)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (children, separator) = match self {
            Expr::Terminal(op) => return write!(f, "{}", op.name()),
            Expr::NonTerminal(name) => return write!(f, "<{}>", name),
            Expr::Sequential(children) => (children, " >> "),
            Expr::Choice(children) => (children, " | "),
            Expr::Parallel(children) => (children, " & "),
        };
        write!(f, "(")?;
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                f.write_str(separator)?;
            }
            write!(f, "{}", child)?;
        }
        write!(f, ")")
    }
}

/// Limits and options for expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// Deepest derivation-tree node allowed; `None` only for acyclic grammars
    pub max_depth: Option<usize>,

    /// Stop after this many pipelines
    pub max_count: Option<usize>,

    /// Split enumeration across the start symbol's productions
    pub parallel: bool,

    /// Attempts made by [`Grammar::sample`] before giving up
    pub sample_attempts: usize,

    /// Random seed for sampling
    pub seed: Option<u64>,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_depth: Some(6),
            max_count: Some(1000),
            parallel: false,
            sample_attempts: 100,
            seed: Some(42),
        }
    }
}

impl ExpansionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the depth bound
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Builder method to remove the depth bound
    pub fn unbounded(mut self) -> Self {
        self.max_depth = None;
        self
    }

    /// Builder method to set the count bound
    pub fn with_max_count(mut self, count: usize) -> Self {
        self.max_count = Some(count);
        self
    }

    /// Builder method to remove the count bound
    pub fn without_max_count(mut self) -> Self {
        self.max_count = None;
        self
    }

    /// Builder method to enable parallel enumeration
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_sample_attempts(mut self, attempts: usize) -> Self {
        self.sample_attempts = attempts;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_attempts == 0 {
            return Err(ComposeError::ConfigError("sample_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Production rules over operators
#[derive(Debug, Clone)]
pub struct Grammar {
    start: String,
    rules: BTreeMap<String, Vec<Expr>>,
}

impl Grammar {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            rules: BTreeMap::new(),
        }
    }

    /// Append a production for `name`
    pub fn rule(mut self, name: impl Into<String>, production: Expr) -> Self {
        self.add_production(name, production);
        self
    }

    /// Append several productions for `name`
    pub fn rules(mut self, name: impl Into<String>, productions: Vec<Expr>) -> Self {
        let name = name.into();
        for production in productions {
            self.add_production(name.clone(), production);
        }
        self
    }

    pub fn add_production(&mut self, name: impl Into<String>, production: Expr) {
        self.rules.entry(name.into()).or_default().push(production);
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn productions(&self, name: &str) -> Option<&[Expr]> {
        self.rules.get(name).map(Vec::as_slice)
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Check that the start symbol and every referenced nonterminal have productions
    pub fn validate(&self) -> Result<()> {
        if self.productions(&self.start).map_or(true, <[Expr]>::is_empty) {
            return Err(ComposeError::GrammarExpansion(format!(
                "start symbol '{}' has no productions",
                self.start
            )));
        }
        for (name, productions) in &self.rules {
            for production in productions {
                if let Some(missing) = production.references().into_iter().find(|r| !self.rules.contains_key(*r)) {
                    return Err(ComposeError::GrammarExpansion(format!(
                        "production {} of '{}' references undefined nonterminal '{}'",
                        production, name, missing
                    )));
                }
            }
        }
        Ok(())
    }

    /// A nonterminal on a cycle reachable from the start symbol, if any
    pub fn find_cycle(&self) -> Option<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        // (nonterminal, successors still to visit)
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(self.start.as_str(), self.successors(&self.start))];
        marks.insert(self.start.as_str(), Mark::Active);
        while let Some((name, successors)) = stack.last_mut() {
            match successors.pop() {
                Some(next) => match marks.get(next) {
                    Some(Mark::Active) => return Some(next.to_string()),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::Active);
                        let successors = self.successors(next);
                        stack.push((next, successors));
                    }
                },
                None => {
                    marks.insert(*name, Mark::Done);
                    stack.pop();
                }
            }
        }
        None
    }

    fn successors(&self, name: &str) -> Vec<&str> {
        let mut successors: Vec<&str> = self
            .productions(name)
            .unwrap_or_default()
            .iter()
            .flat_map(Expr::references)
            .collect();
        successors.dedup();
        successors
    }

    /// Depth bound for expansion: the configured one, or the longest derivation of
    /// an acyclic grammar
    pub fn depth_bound(&self, config: &ExpansionConfig) -> Result<usize> {
        if let Some(depth) = config.max_depth {
            return Ok(depth);
        }
        if let Some(nonterminal) = self.find_cycle() {
            return Err(ComposeError::UnboundedRecursion { nonterminal });
        }
        let mut memo = HashMap::new();
        Ok(self.longest(&self.start, &mut memo))
    }

    /// Deepest node a derivation from `name` reaches, relative to `name`
    fn longest<'a>(&'a self, name: &'a str, memo: &mut HashMap<&'a str, usize>) -> usize {
        if let Some(&depth) = memo.get(name) {
            return depth;
        }
        let depth = self
            .productions(name)
            .unwrap_or_default()
            .iter()
            .map(|p| 1 + self.extent(p, memo))
            .max()
            .unwrap_or(0);
        memo.insert(name, depth);
        depth
    }

    fn extent<'a>(&'a self, expr: &'a Expr, memo: &mut HashMap<&'a str, usize>) -> usize {
        match expr {
            Expr::Terminal(op) => op.depth(),
            Expr::NonTerminal(name) => self.longest(name, memo),
            Expr::Sequential(children) | Expr::Choice(children) | Expr::Parallel(children) => {
                1 + children.iter().map(|c| self.extent(c, memo)).max().unwrap_or(0)
            }
        }
    }

    /// Lazily enumerate derived pipelines in production order
    pub fn expand(&self, config: &ExpansionConfig) -> Result<Expansion<'_>> {
        let max_depth = self.depth_bound(config)?;
        let root = Node::Pending {
            name: self.start.clone(),
            depth: 0,
        };
        Ok(Expansion::new(self, vec![root], max_depth, config.max_count))
    }

    /// Collect derived pipelines, in parallel when configured
    pub fn enumerate(&self, config: &ExpansionConfig) -> Result<Vec<Operator>> {
        if config.parallel {
            return self.enumerate_parallel(config);
        }
        let pipelines = self.expand(config)?.collect::<Result<Vec<_>>>()?;
        info!(start = %self.start, count = pipelines.len(), "Enumerated pipelines");
        Ok(pipelines)
    }

    /// Enumerate each production of the start symbol on the rayon pool.
    ///
    /// Ordering across productions is not preserved.
    pub fn enumerate_parallel(&self, config: &ExpansionConfig) -> Result<Vec<Operator>> {
        let max_depth = self.depth_bound(config)?;
        let productions = self.productions(&self.start).unwrap_or_default();

        let results: Vec<(Vec<Operator>, ExpansionStats)> = productions
            .par_iter()
            .map(|production| match instantiate(production, 0, max_depth) {
                Ok(root) => {
                    let mut expansion = Expansion::new(self, vec![root], max_depth, config.max_count);
                    let pipelines: Vec<Operator> = expansion.by_ref().filter_map(|r| r.ok()).collect();
                    (pipelines, expansion.stats())
                }
                Err(failure) => {
                    let mut stats = ExpansionStats::default();
                    stats.record(failure);
                    (Vec::new(), stats)
                }
            })
            .collect();

        let mut stats = ExpansionStats::default();
        if productions.is_empty() {
            stats.record(Failure::NoProduction);
        }
        let mut pipelines = Vec::new();
        for (found, worker_stats) in results {
            stats.merge(&worker_stats);
            pipelines.extend(found);
        }
        if pipelines.is_empty() && stats.failures() > 0 {
            return Err(stats.exhausted_error(&self.start));
        }
        if let Some(max_count) = config.max_count {
            pipelines.truncate(max_count);
        }
        info!(start = %self.start, count = pipelines.len(), workers = productions.len(), "Enumerated pipelines in parallel");
        Ok(pipelines)
    }

    /// Draw one pipeline by choosing productions at random.
    ///
    /// Each attempt expands the leftmost nonterminal with a uniformly drawn
    /// production; dead ends start a new attempt.
    pub fn sample(&self, rng: &mut impl Rng, config: &ExpansionConfig) -> Result<Operator> {
        config.validate()?;
        let max_depth = self.depth_bound(config)?;
        let mut stats = ExpansionStats::default();
        for attempt in 0..config.sample_attempts {
            match sample_once(self, rng, max_depth) {
                Ok(op) => {
                    debug!(attempt, pipeline = %op, "Sampled pipeline");
                    return Ok(op);
                }
                Err(failure) => stats.record(failure),
            }
        }
        Err(ComposeError::GrammarExpansion(format!(
            "no pipeline sampled from '{}' in {} attempts ({} too deep, {} without productions, {} ill-typed)",
            self.start, config.sample_attempts, stats.too_deep, stats.no_production, stats.ill_typed
        )))
    }

    /// [`sample`](Self::sample) `n` pipelines with a generator seeded from the config
    pub fn sample_n(&self, n: usize, config: &ExpansionConfig) -> Result<Vec<Operator>> {
        let mut rng = match config.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        (0..n).map(|_| self.sample(&mut rng, config)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ObjectSchema, Schema};

    fn table() -> Schema {
        Schema::object(ObjectSchema::new().required("X", Schema::array_of(Schema::number())))
    }

    fn transformer(name: &str) -> Operator {
        Operator::individual(name).input(table()).output(table()).build().unwrap()
    }

    fn estimator(name: &str) -> Operator {
        Operator::individual(name)
            .input(table())
            .output(Schema::array_of(Schema::integer()))
            .build()
            .unwrap()
    }

    fn simple() -> Grammar {
        Grammar::new("start")
            .rule("start", Expr::seq(vec![Expr::nt("prep"), Expr::nt("est")]))
            .rules("prep", vec![Expr::terminal(&transformer("Scale")), Expr::terminal(&transformer("PCA"))])
            .rules("est", vec![Expr::terminal(&estimator("KNN")), Expr::terminal(&estimator("LR"))])
    }

    #[test]
    fn test_enumerates_in_production_order() {
        let names: Vec<String> = simple()
            .enumerate(&ExpansionConfig::default())
            .unwrap()
            .iter()
            .map(|op| op.to_string())
            .collect();
        assert_eq!(names, vec!["Scale >> KNN", "Scale >> LR", "PCA >> KNN", "PCA >> LR"]);
    }

    #[test]
    fn test_max_count() {
        let config = ExpansionConfig::new().with_max_count(3);
        assert_eq!(simple().enumerate(&config).unwrap().len(), 3);
    }

    #[test]
    fn test_recursive_grammar_needs_bound() {
        let grammar = Grammar::new("start")
            .rules(
                "start",
                vec![
                    Expr::nt("est"),
                    Expr::seq(vec![Expr::terminal(&transformer("Scale")), Expr::nt("start")]),
                ],
            )
            .rule("est", Expr::terminal(&estimator("KNN")));

        let err = grammar.enumerate(&ExpansionConfig::new().unbounded()).err().unwrap();
        assert!(matches!(err, ComposeError::UnboundedRecursion { ref nonterminal } if nonterminal == "start"));

        let bound = 4;
        let pipelines = grammar
            .enumerate(&ExpansionConfig::new().with_max_depth(bound).without_max_count())
            .unwrap();
        assert!(!pipelines.is_empty());
        assert!(pipelines.iter().all(|p| p.depth() <= bound));
        assert_eq!(pipelines[0].to_string(), "KNN");
    }

    #[test]
    fn test_exhausted_expansion_errors() {
        let grammar = Grammar::new("start")
            .rule("start", Expr::seq(vec![Expr::nt("prep"), Expr::nt("missing")]))
            .rule("prep", Expr::terminal(&transformer("Scale")));
        let err = grammar.enumerate(&ExpansionConfig::default()).unwrap_err();
        assert!(matches!(err, ComposeError::GrammarExpansion(_)));
        assert!(grammar.validate().is_err());
    }

    #[test]
    fn test_ill_typed_candidates_skipped() {
        // estimator output cannot feed a transformer
        let grammar = Grammar::new("start")
            .rules(
                "start",
                vec![
                    Expr::seq(vec![Expr::terminal(&estimator("KNN")), Expr::terminal(&transformer("Scale"))]),
                    Expr::seq(vec![Expr::terminal(&transformer("Scale")), Expr::terminal(&estimator("KNN"))]),
                ],
            );
        let pipelines = grammar.enumerate(&ExpansionConfig::default()).unwrap();
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].to_string(), "Scale >> KNN");
    }

    #[test]
    fn test_acyclic_without_bound_uses_longest_derivation() {
        let grammar = simple();
        assert!(grammar.find_cycle().is_none());
        assert_eq!(grammar.depth_bound(&ExpansionConfig::new().unbounded()).unwrap(), 3);
        assert_eq!(grammar.enumerate(&ExpansionConfig::new().unbounded()).unwrap().len(), 4);
    }

    #[test]
    fn test_parallel_matches_sequential_set() {
        let grammar = Grammar::new("start")
            .rules("start", vec![Expr::nt("a"), Expr::nt("b")])
            .rules("a", vec![Expr::terminal(&estimator("KNN")), Expr::terminal(&estimator("LR"))])
            .rule("b", Expr::seq(vec![Expr::terminal(&transformer("PCA")), Expr::terminal(&estimator("SVC"))]));
        let mut sequential: Vec<String> = grammar
            .enumerate(&ExpansionConfig::default())
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        let mut parallel: Vec<String> = grammar
            .enumerate(&ExpansionConfig::new().with_parallel(true))
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        sequential.sort();
        parallel.sort();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_seeded_sampling_is_deterministic() {
        let grammar = simple();
        let config = ExpansionConfig::new().with_seed(7);
        let a: Vec<String> = grammar.sample_n(5, &config).unwrap().iter().map(|p| p.to_string()).collect();
        let b: Vec<String> = grammar.sample_n(5, &config).unwrap().iter().map(|p| p.to_string()).collect();
        assert_eq!(a, b);
    }
}

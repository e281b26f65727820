//! Derivation trees and the expansion iterator

use super::{Expr, Grammar};
use crate::algebra::Combinator;
use crate::error::{ComposeError, Result};
use crate::operator::Operator;
use rand::Rng;
use tracing::debug;

/// Partially expanded derivation tree
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Op(Operator),
    Pending { name: String, depth: usize },
    Combine(Combinator, Vec<Node>),
}

/// Why a derivation was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    TooDeep,
    NoProduction,
    IllTyped,
}

/// Tally of abandoned derivations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionStats {
    pub yielded: usize,
    pub too_deep: usize,
    pub no_production: usize,
    pub ill_typed: usize,
}

impl ExpansionStats {
    pub fn failures(&self) -> usize {
        self.too_deep + self.no_production + self.ill_typed
    }

    pub(crate) fn record(&mut self, failure: Failure) {
        match failure {
            Failure::TooDeep => self.too_deep += 1,
            Failure::NoProduction => self.no_production += 1,
            Failure::IllTyped => self.ill_typed += 1,
        }
    }

    pub(crate) fn merge(&mut self, other: &ExpansionStats) {
        self.yielded += other.yielded;
        self.too_deep += other.too_deep;
        self.no_production += other.no_production;
        self.ill_typed += other.ill_typed;
    }

    pub(crate) fn exhausted_error(&self, start: &str) -> ComposeError {
        ComposeError::GrammarExpansion(format!(
            "no pipeline derived from '{}': {} branches exceeded the depth bound, {} reached nonterminals without productions, {} were ill-typed",
            start, self.too_deep, self.no_production, self.ill_typed
        ))
    }
}

/// Instantiate a production as the replacement of a nonterminal at `depth`.
///
/// The production root sits at `depth + 1`, combinator children one below their
/// combinator. A terminal operator extends its node's depth by its own nesting.
pub(crate) fn instantiate(expr: &Expr, depth: usize, max_depth: usize) -> std::result::Result<Node, Failure> {
    let root_depth = depth + 1;
    let mut stack: Vec<(&Expr, usize, Vec<Node>, usize)> = Vec::new();
    let mut finished: Option<Node> = None;

    // Post-order construction with an explicit stack of (expr, depth, built children, next child)
    stack.push((expr, root_depth, Vec::new(), 0));
    while let Some((current, d, built, next)) = stack.pop() {
        if d > max_depth {
            return Err(Failure::TooDeep);
        }
        let children = match current {
            Expr::Terminal(op) => {
                if d + op.depth() > max_depth {
                    return Err(Failure::TooDeep);
                }
                deliver(&mut stack, &mut finished, Node::Op(op.clone()));
                continue;
            }
            Expr::NonTerminal(name) => {
                deliver(&mut stack, &mut finished, Node::Pending { name: name.clone(), depth: d });
                continue;
            }
            Expr::Sequential(children) | Expr::Choice(children) | Expr::Parallel(children) => children,
        };
        if next < children.len() {
            let child = &children[next];
            stack.push((current, d, built, next + 1));
            stack.push((child, d + 1, Vec::new(), 0));
        } else {
            let combinator = match current {
                Expr::Sequential(_) => Combinator::Sequential,
                Expr::Choice(_) => Combinator::Choice,
                _ => Combinator::Parallel,
            };
            deliver(&mut stack, &mut finished, Node::Combine(combinator, built));
        }
    }
    finished.ok_or(Failure::NoProduction)
}

fn deliver(stack: &mut [(&Expr, usize, Vec<Node>, usize)], finished: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some((_, _, built, _)) => built.push(node),
        None => *finished = Some(node),
    }
}

/// Index path to the leftmost pending nonterminal
fn leftmost_pending(root: &Node) -> Option<(Vec<usize>, String, usize)> {
    let mut stack = vec![(root, Vec::new())];
    while let Some((node, path)) = stack.pop() {
        match node {
            Node::Pending { name, depth } => return Some((path, name.clone(), *depth)),
            Node::Combine(_, children) => {
                for (i, child) in children.iter().enumerate().rev() {
                    let mut child_path = path.clone();
                    child_path.push(i);
                    stack.push((child, child_path));
                }
            }
            Node::Op(_) => {}
        }
    }
    None
}

fn replace_at(root: &mut Node, path: &[usize], replacement: Node) {
    let mut current = root;
    for &i in path {
        current = match current {
            Node::Combine(_, children) => &mut children[i],
            other => other,
        };
    }
    *current = replacement;
}

/// Fold a fully expanded tree into one operator through the combinators
pub(crate) fn build(root: &Node) -> Result<Operator> {
    match root {
        Node::Op(op) => Ok(op.clone()),
        Node::Pending { name, .. } => Err(ComposeError::GrammarExpansion(format!(
            "nonterminal '{}' left unexpanded",
            name
        ))),
        Node::Combine(combinator, children) => {
            let children = children.iter().map(build).collect::<Result<Vec<_>>>()?;
            combinator.combine(children)
        }
    }
}

/// Lazy depth-first enumeration of the pipelines a grammar derives.
///
/// Productions are tried in order for the leftmost pending nonterminal. When the
/// stack runs dry without having yielded anything but with abandoned branches,
/// the iterator ends with a single [`ComposeError::GrammarExpansion`].
pub struct Expansion<'g> {
    grammar: &'g Grammar,
    stack: Vec<Node>,
    max_depth: usize,
    remaining: Option<usize>,
    stats: ExpansionStats,
    done: bool,
}

impl<'g> Expansion<'g> {
    pub(crate) fn new(grammar: &'g Grammar, roots: Vec<Node>, max_depth: usize, max_count: Option<usize>) -> Self {
        let mut stack = roots;
        stack.reverse();
        Self {
            grammar,
            stack,
            max_depth,
            remaining: max_count,
            stats: ExpansionStats::default(),
            done: false,
        }
    }

    /// Counts so far
    pub fn stats(&self) -> ExpansionStats {
        self.stats
    }

    pub(crate) fn fail(&mut self, failure: Failure) {
        self.stats.record(failure);
    }
}

impl Iterator for Expansion<'_> {
    type Item = Result<Operator>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        let grammar = self.grammar;
        while let Some(partial) = self.stack.pop() {
            let Some((path, name, depth)) = leftmost_pending(&partial) else {
                match build(&partial) {
                    Ok(op) => {
                        self.stats.yielded += 1;
                        if let Some(remaining) = self.remaining.as_mut() {
                            *remaining -= 1;
                        }
                        return Some(Ok(op));
                    }
                    Err(e) => {
                        debug!(error = %e, "Skipping ill-typed candidate");
                        self.fail(Failure::IllTyped);
                        continue;
                    }
                }
            };
            let productions = match grammar.productions(&name) {
                Some(productions) if !productions.is_empty() => productions,
                _ => {
                    debug!(nonterminal = %name, "No productions");
                    self.fail(Failure::NoProduction);
                    continue;
                }
            };
            for production in productions.iter().rev() {
                match instantiate(production, depth, self.max_depth) {
                    Ok(node) => {
                        let mut next = partial.clone();
                        replace_at(&mut next, &path, node);
                        self.stack.push(next);
                    }
                    Err(failure) => {
                        debug!(nonterminal = %name, depth, "Pruning production");
                        self.fail(failure);
                    }
                }
            }
        }
        self.done = true;
        if self.stats.yielded == 0 && self.stats.failures() > 0 {
            return Some(Err(self.stats.exhausted_error(grammar.start())));
        }
        None
    }
}

/// One random derivation, or why it dead-ended
pub(crate) fn sample_once(grammar: &Grammar, rng: &mut impl Rng, max_depth: usize) -> std::result::Result<Operator, Failure> {
    let mut tree = Node::Pending {
        name: grammar.start().to_string(),
        depth: 0,
    };
    while let Some((path, name, depth)) = leftmost_pending(&tree) {
        let productions = grammar
            .productions(&name)
            .filter(|p| !p.is_empty())
            .ok_or(Failure::NoProduction)?;
        let production = &productions[rng.gen_range(0..productions.len())];
        let node = instantiate(production, depth, max_depth)?;
        replace_at(&mut tree, &path, node);
    }
    build(&tree).map_err(|e| {
        debug!(error = %e, "Sampled candidate is ill-typed");
        Failure::IllTyped
    })
}

//! Integration tests for pipeline grammars

use kolosal_compose::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::HashSet;

fn table() -> Schema {
    Schema::object(ObjectSchema::new().required("X", Schema::array_of(Schema::array_of(Schema::number()))))
}

fn labels() -> Schema {
    Schema::array_of(Schema::integer())
}

fn transformer(name: &str) -> Operator {
    Operator::individual(name).input(table()).output(table()).build().unwrap()
}

fn estimator(name: &str) -> Operator {
    Operator::individual(name).input(table()).output(labels()).build().unwrap()
}

/// start ::= est | prep >> start
fn recursive() -> Grammar {
    Grammar::new("start")
        .rules(
            "start",
            vec![
                Expr::nt("est"),
                Expr::seq(vec![Expr::nt("prep"), Expr::nt("start")]),
            ],
        )
        .rules(
            "prep",
            vec![Expr::terminal(&transformer("Scale")), Expr::terminal(&transformer("PCA"))],
        )
        .rules(
            "est",
            vec![Expr::terminal(&estimator("KNN")), Expr::terminal(&estimator("LR"))],
        )
}

#[test]
fn test_depth_bound_terminates() {
    let grammar = recursive();
    for depth in 2..=6 {
        let config = ExpansionConfig::new().with_max_depth(depth).without_max_count();
        let pipelines = grammar.enumerate(&config).unwrap();
        assert!(pipelines.iter().all(|p| p.depth() <= depth));
        let distinct: HashSet<String> = pipelines.iter().map(|p| p.to_string()).collect();
        assert_eq!(distinct.len(), pipelines.len());
    }
}

#[test]
fn test_deeper_bound_yields_more() {
    let grammar = recursive();
    let shallow = grammar.enumerate(&ExpansionConfig::new().with_max_depth(3).without_max_count()).unwrap();
    let deep = grammar.enumerate(&ExpansionConfig::new().with_max_depth(5).without_max_count()).unwrap();
    assert!(deep.len() > shallow.len());
    let deep_names: HashSet<String> = deep.iter().map(|p| p.to_string()).collect();
    assert!(shallow.iter().all(|p| deep_names.contains(&p.to_string())));
}

#[test]
fn test_recursion_without_bound_is_rejected() {
    let err = recursive().enumerate(&ExpansionConfig::new().unbounded()).unwrap_err();
    assert!(matches!(err, ComposeError::UnboundedRecursion { .. }));
    assert!(recursive().find_cycle().is_some());
}

#[test]
fn test_too_shallow_bound_is_an_expansion_error() {
    let err = recursive().enumerate(&ExpansionConfig::new().with_max_depth(1)).unwrap_err();
    assert!(matches!(err, ComposeError::GrammarExpansion(_)));
}

#[test]
fn test_lazy_expansion_and_stats() {
    let grammar = recursive();
    let mut expansion = grammar.expand(&ExpansionConfig::new().with_max_depth(4).with_max_count(3)).unwrap();
    let first: Vec<String> = expansion.by_ref().map(|r| r.unwrap().to_string()).collect();
    assert_eq!(first.len(), 3);
    assert_eq!(first[0], "KNN");
    assert_eq!(first[1], "LR");
    assert_eq!(expansion.stats().yielded, 3);
}

#[test]
fn test_combinator_productions() {
    let grammar = Grammar::new("start")
        .rule("start", Expr::seq(vec![Expr::nt("features"), Expr::nt("est")]))
        .rule(
            "features",
            Expr::choice(vec![Expr::terminal(&transformer("Scale")), Expr::terminal(&transformer("PCA"))]),
        )
        .rule("est", Expr::terminal(&estimator("KNN")));
    let pipelines = grammar.enumerate(&ExpansionConfig::default()).unwrap();
    assert_eq!(pipelines.len(), 1);
    assert_eq!(pipelines[0].to_string(), "(Scale | PCA) >> KNN");
}

#[test]
fn test_sampling_draws_well_typed_pipelines() {
    let grammar = recursive();
    let config = ExpansionConfig::new().with_max_depth(5);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    for _ in 0..20 {
        let pipeline = grammar.sample(&mut rng, &config).unwrap();
        assert!(pipeline.depth() <= 5);
        assert!(is_subsumed_by(pipeline.output_schema(), &labels()));
    }
}

#[test]
fn test_sampling_gives_up() {
    // every derivation is ill-typed
    let grammar = Grammar::new("start").rule(
        "start",
        Expr::seq(vec![Expr::terminal(&estimator("KNN")), Expr::terminal(&estimator("LR"))]),
    );
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    let config = ExpansionConfig::new().with_sample_attempts(5);
    assert!(matches!(
        grammar.sample(&mut rng, &config),
        Err(ComposeError::GrammarExpansion(_))
    ));
}

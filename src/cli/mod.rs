//! Kolosal Compose CLI Module
//!
//! Command-line interface for type-checking pipelines, compiling their search
//! spaces and validating hyperparameters.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ComposeConfig;
use crate::error::{ComposeError, ValidationOrigin};
use crate::operator::{Operator, OperatorRegistry, PipelineDescription};
use crate::schema::Schema;
use crate::search_space::{SearchSpaceCompiler, TrialParams};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<14} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-compose")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Typed ML pipeline composition and search-space compilation")]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Type-check a pipeline against an operator catalog
    Check {
        /// Operator catalog (JSON)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Pipeline description (JSON)
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Print the compiled hyperparameter search space
    Space {
        /// Operator catalog (JSON)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Pipeline description (JSON)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Enumerate grid configurations instead of printing the space
        #[arg(long)]
        grid: bool,
    },

    /// Validate a hyperparameter document against a pipeline
    Validate {
        /// Operator catalog (JSON)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Pipeline description (JSON)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Hyperparameters (JSON)
        #[arg(long)]
        hyperparams: PathBuf,
    },

    /// Draw random configurations from the search space and apply them
    Sample {
        /// Operator catalog (JSON)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Pipeline description (JSON)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Number of samples
        #[arg(short, long, default_value = "5")]
        n: usize,

        /// Random seed (overrides the configured one)
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// One leaf operator in a catalog file
#[derive(Debug, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub input: Option<Schema>,
    #[serde(default)]
    pub output: Option<Schema>,
    #[serde(default)]
    pub hyperparams: Option<Schema>,
}

/// Leaf operators available to pipeline descriptions
#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub operators: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a registry, rejecting malformed schemas and duplicate names
    pub fn into_registry(self) -> crate::error::Result<OperatorRegistry> {
        let mut registry = OperatorRegistry::new();
        for entry in self.operators {
            let mut builder = Operator::individual(entry.name);
            if let Some(input) = entry.input {
                builder = builder.input(input);
            }
            if let Some(output) = entry.output {
                builder = builder.output(output);
            }
            if let Some(hyperparams) = entry.hyperparams {
                builder = builder.hyperparameters(hyperparams);
            }
            registry.register(builder.build()?)?;
        }
        Ok(registry)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<ComposeConfig> {
    match path {
        Some(path) => ComposeConfig::from_file(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(ComposeConfig::default()),
    }
}

/// Load a catalog and rebuild the described pipeline from it
pub fn load_pipeline(catalog: &Path, pipeline: &Path) -> anyhow::Result<Operator> {
    let registry = read_json::<Catalog>(catalog)?.into_registry()?;
    let description: PipelineDescription = read_json(pipeline)?;
    Ok(registry.reconstruct(&description)?)
}

fn params_json(params: &TrialParams) -> Value {
    Value::Object(params.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Rejected samples by the origin of the failure
#[derive(Debug, Default, PartialEq)]
struct RejectionTally {
    optimizer: usize,
    constraint: usize,
    other: usize,
}

impl RejectionTally {
    fn record(&mut self, error: &ComposeError) {
        match error {
            ComposeError::HyperparameterValidation { origin: ValidationOrigin::Optimizer, .. } => self.optimizer += 1,
            ComposeError::HyperparameterValidation { origin: ValidationOrigin::Constraint, .. } => self.constraint += 1,
            _ => self.other += 1,
        }
    }

    fn total(&self) -> usize {
        self.optimizer + self.constraint + self.other
    }

    fn lines(&self) -> Vec<(usize, &'static str)> {
        [
            (self.optimizer, "fell outside their declared domains"),
            (self.constraint, "rejected by constraints"),
            (self.other, "failed for other reasons"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .collect()
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_check(catalog: &Path, pipeline: &Path) -> anyhow::Result<()> {
    section("Type check");
    let start = Instant::now();
    let op = match load_pipeline(catalog, pipeline) {
        Ok(op) => op,
        Err(e) => {
            step_fail(&e.to_string());
            return Err(e);
        }
    };
    step_ok(&format!("{} {}", op.to_string().white().bold(), dim(&format!("({:.2?})", start.elapsed()))));
    println!();
    kv("Leaves", &op.leaf_count().to_string());
    kv("Depth", &op.depth().to_string());
    section("Input schema");
    println!("{}", pretty(&op.input_schema().to_json()));
    section("Output schema");
    println!("{}", pretty(&op.output_schema().to_json()));
    Ok(())
}

pub fn cmd_space(config: &ComposeConfig, catalog: &Path, pipeline: &Path, grid: bool) -> anyhow::Result<()> {
    let op = load_pipeline(catalog, pipeline)?;
    let compiler = SearchSpaceCompiler::new(config.compiler.clone());
    let space = compiler.compile_operator(&op)?;

    if !grid {
        println!("{}", serde_json::to_string_pretty(space.as_ref())?);
        return Ok(());
    }

    let configurations = space.grid(&config.compiler)?;
    section(&format!("Grid for {}", op));
    kv("Grids", &space.grid_count().to_string());
    kv("Points", &configurations.len().to_string());
    println!();
    for params in &configurations {
        println!("  {}", params_json(params));
    }
    Ok(())
}

pub fn cmd_validate(catalog: &Path, pipeline: &Path, hyperparams: &Path) -> anyhow::Result<()> {
    let op = load_pipeline(catalog, pipeline)?;
    let value: Value = read_json(hyperparams)?;
    section(&format!("Validate {}", op));
    match op.validate_hyperparameters(&value, ValidationOrigin::User) {
        Ok(()) => {
            step_ok("hyperparameters are valid");
            Ok(())
        }
        Err(e) => {
            step_fail(&e.to_string());
            Err(e.into())
        }
    }
}

pub fn cmd_sample(config: &ComposeConfig, catalog: &Path, pipeline: &Path, n: usize, seed: Option<u64>) -> anyhow::Result<()> {
    let op = load_pipeline(catalog, pipeline)?;
    let compiler = SearchSpaceCompiler::new(config.compiler.clone());
    let space = compiler.compile_operator(&op)?;

    let seed = seed.or(config.expansion.seed);
    let mut rng = match seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    };

    section(&format!("Samples for {}", op));
    if let Some(seed) = seed {
        kv("Seed", &seed.to_string());
    }
    kv("Dimensions", &space.all_parameters().len().to_string());
    println!();

    let mut tally = RejectionTally::default();
    for i in 0..n {
        let params = space.sample(&mut rng);
        match space.apply(&params) {
            Ok(value) => println!("  {} {}", accent(&format!("#{:<3}", i + 1)), value),
            Err(e) => {
                tally.record(&e);
                println!("  {} {}", accent(&format!("#{:<3}", i + 1)), e.to_string().yellow());
            }
        }
    }
    println!();
    if tally.total() == 0 {
        step_ok(&format!("{} samples applied", n));
    } else {
        for (count, what) in tally.lines() {
            println!("  {} of {} samples {}", count.to_string().yellow(), n, what);
        }
    }
    Ok(())
}

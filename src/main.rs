//! Kolosal Compose - Main Entry Point
//!
//! Type-check pipelines and compile their search spaces from the command line.

use clap::Parser;
use kolosal_compose::cli::{cmd_check, cmd_sample, cmd_space, cmd_validate, load_config, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_compose=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { catalog, pipeline } => {
            cmd_check(&catalog, &pipeline)?;
        }
        Commands::Space { catalog, pipeline, grid } => {
            cmd_space(&config, &catalog, &pipeline, grid)?;
        }
        Commands::Validate { catalog, pipeline, hyperparams } => {
            cmd_validate(&catalog, &pipeline, &hyperparams)?;
        }
        Commands::Sample { catalog, pipeline, n, seed } => {
            cmd_sample(&config, &catalog, &pipeline, n, seed)?;
        }
    }

    Ok(())
}

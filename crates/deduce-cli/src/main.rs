//! Deduce CLI - Expense anomaly detection and trend analysis
//!
//! Usage:
//!   deduce stats --file expenses.csv                 Category baselines
//!   deduce check --file expenses.csv -c CONCEPT -a N Review a new expense
//!   deduce trends --file expenses.csv --months 6     Month-over-month comparison
//!   deduce summary --file expenses.csv               Totals by category
//!   deduce watch --file expenses.csv                 Poll for category exceptions

mod cli;
mod commands;


use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use deduce_core::EngineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load engine config")?;
    let output = commands::Output { json: cli.json };

    match cli.command {
        Commands::Stats { input } => commands::cmd_stats(&config, &input, output).await,
        Commands::Check {
            input,
            id,
            concept,
            amount,
            date,
            category,
            not_deductible,
            attachments,
        } => {
            let target = match (id, concept, amount) {
                (Some(id), _, _) => commands::CheckTarget::Existing(id),
                (None, Some(concept), Some(amount)) => commands::CheckTarget::New {
                    concept,
                    amount,
                    date,
                    category,
                    deductible: !not_deductible,
                    attachments,
                },
                _ => anyhow::bail!("Pass --id, or --concept together with --amount"),
            };
            commands::cmd_check(&config, &input, target, output).await
        }
        Commands::Trends { input, months } => {
            commands::cmd_trends(&config, &input, months, output).await
        }
        Commands::Summary { input } => commands::cmd_summary(&input, output),
        Commands::Watch {
            input,
            interval_secs,
            once,
        } => {
            let mut config = config;
            if let Some(secs) = interval_secs {
                anyhow::ensure!(secs > 0, "--interval-secs must be positive");
                config.monitor.poll_interval_secs = secs;
            }
            commands::cmd_watch(config, &input, once, output).await
        }
    }
}

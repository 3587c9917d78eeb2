//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Deduce - Review business expenses before they become a problem
#[derive(Parser)]
#[command(name = "deduce")]
#[command(about = "Expense anomaly detection and trend analysis", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Engine config file (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Expense data source shared by every command
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Expense file (.csv or .json)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Reference date, YYYY-MM-DD (defaults to today)
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show per-category baseline statistics
    Stats {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Check an expense against the review rules
    ///
    /// Either pass --id to re-check an expense from the file, or describe a
    /// new expense with --concept and --amount.
    Check {
        #[command(flatten)]
        input: InputArgs,

        /// Id of an expense in the file
        #[arg(long, conflicts_with_all = ["concept", "amount"])]
        id: Option<String>,

        /// Concept of the new expense
        #[arg(short, long, requires = "amount")]
        concept: Option<String>,

        /// Amount in major units (e.g. 120.50)
        #[arg(short, long, requires = "concept")]
        amount: Option<String>,

        /// Expense date, YYYY-MM-DD (defaults to --as-of)
        #[arg(long)]
        date: Option<String>,

        /// Category (auto-detected from the concept if not specified)
        #[arg(long)]
        category: Option<String>,

        /// Mark the expense as not deductible
        #[arg(long)]
        not_deductible: bool,

        /// Attached receipt or invoice (repeatable)
        #[arg(long = "attachment")]
        attachments: Vec<String>,
    },

    /// Compare monthly spending per category
    Trends {
        #[command(flatten)]
        input: InputArgs,

        /// Months to compare: 3, 6 or 12 (defaults to the configured window)
        #[arg(short, long)]
        months: Option<u32>,
    },

    /// Show totals and the per-category breakdown
    Summary {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Poll for category spending exceptions and log new alerts
    Watch {
        #[command(flatten)]
        input: InputArgs,

        /// Seconds between polls (defaults to the configured interval)
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Run a single poll and exit
        #[arg(long)]
        once: bool,
    },
}

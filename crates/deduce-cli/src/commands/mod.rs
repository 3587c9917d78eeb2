//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `stats` - Category baseline statistics
//! - `check` - Review a new or existing expense
//! - `trends` - Month-over-month comparison and category exceptions
//! - `summary` - Totals and per-category breakdown
//! - `watch` - Poll for category exceptions
//!
//! Shared helpers (loading expense files, resolving dates, formatting) live here.

pub mod check;
pub mod stats;
pub mod summary;
pub mod trends;
pub mod watch;

// Re-export command functions for main.rs
pub use check::*;
pub use stats::*;
pub use summary::*;
pub use trends::*;
pub use watch::*;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use deduce_core::{import, EngineConfig, Expense, ExpenseMonitor, InMemoryExpenseRepository};

use crate::cli::InputArgs;

/// Output mode selected by the global flags
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn print_json(&self, value: serde_json::Value) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialize output")?
        );
        Ok(())
    }
}

/// Load the expense file named by `--file`
pub fn load_expenses(input: &InputArgs) -> Result<Vec<Expense>> {
    import::load_file(&input.file)
        .with_context(|| format!("Failed to load expenses from {}", input.file.display()))
}

/// `--as-of`, or today when not given
pub fn resolve_as_of(input: &InputArgs) -> Result<NaiveDate> {
    match input.as_of.as_deref() {
        Some(s) => parse_date(s, "--as-of"),
        None => Ok(Utc::now().date_naive()),
    }
}

pub fn parse_date(s: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date format (use YYYY-MM-DD)", flag))
}

/// Monitor over an in-memory snapshot of `expenses`
pub fn build_monitor(config: &EngineConfig, expenses: Vec<Expense>) -> ExpenseMonitor {
    let repository = InMemoryExpenseRepository::with_expenses(expenses);
    ExpenseMonitor::new(Arc::new(repository), config.clone())
}

/// Format minor units as major units with two decimals
pub fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

//! Expense review command

use anyhow::{anyhow, Context, Result};
use deduce_core::import::parse_amount;
use deduce_core::{
    Alert, Attachment, CandidateCheck, Category, EngineConfig, NewExpense, Severity,
};

use super::{build_monitor, format_amount, load_expenses, parse_date, resolve_as_of, Output};
use crate::cli::InputArgs;

/// What to check
#[derive(Debug, Clone)]
pub enum CheckTarget {
    /// An expense already present in the file
    Existing(String),
    /// An expense about to be recorded
    New {
        concept: String,
        /// Major units, as typed
        amount: String,
        date: Option<String>,
        category: Option<String>,
        deductible: bool,
        attachments: Vec<String>,
    },
}

pub async fn cmd_check(
    config: &EngineConfig,
    input: &InputArgs,
    target: CheckTarget,
    output: Output,
) -> Result<()> {
    let expenses = load_expenses(input)?;
    let as_of = resolve_as_of(input)?;

    let check = match target {
        CheckTarget::Existing(id) => {
            let expense = expenses
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or_else(|| anyhow!("Expense not found: {}", id))?;
            let monitor = build_monitor(config, expenses);
            monitor.check_expense(expense, as_of).await?
        }
        CheckTarget::New {
            concept,
            amount,
            date,
            category,
            deductible,
            attachments,
        } => {
            let new = NewExpense {
                date: match date.as_deref() {
                    Some(d) => parse_date(d, "--date")?,
                    None => as_of,
                },
                concept,
                amount: parse_amount(&amount).context("Invalid --amount")?,
                category: category
                    .as_deref()
                    .map(str::parse::<Category>)
                    .transpose()
                    .map_err(|e| anyhow!(e))?,
                vat_type: None,
                deductible,
                notes: None,
                attachments: attachments.iter().map(|a| Attachment::reference(a)).collect(),
                origin: None,
                created_by: None,
            };
            let monitor = build_monitor(config, expenses);
            monitor.check_new(&new, as_of).await?
        }
    };

    if output.json {
        return output.print_json(serde_json::to_value(&check)?);
    }

    print_check(&check);
    Ok(())
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "🚫",
        Severity::Warning => "⚠️ ",
        Severity::Info => "💡",
    }
}

fn print_alert(alert: &Alert) {
    println!(
        "   {} {} ({})",
        severity_icon(alert.severity),
        alert.title(),
        alert.severity
    );
    println!("      {}", alert.message);
    println!("      ({})", alert.rule.description());
}

fn print_check(check: &CandidateCheck) {
    let candidate = &check.candidate;

    println!();
    println!("🔍 Expense Review");
    println!(
        "   {} · {} · {} · {}",
        candidate.date,
        candidate.concept,
        format_amount(candidate.amount),
        candidate.category.label()
    );
    println!("   ─────────────────────────────────────────────────────────────");

    if check.baseline_categories == 0 {
        println!("   (no category baselines available yet)");
    }

    match &check.alert {
        None => println!("   ✅ No review alerts. This expense looks normal."),
        Some(alert) => {
            print_alert(alert);
            let others: Vec<&Alert> = check
                .findings
                .iter()
                .filter(|f| f.rule != alert.rule)
                .collect();
            if !others.is_empty() {
                println!();
                println!("   Also noticed:");
                for other in others {
                    print_alert(other);
                }
            }
        }
    }
}

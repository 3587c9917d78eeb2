//! Expense summary command

use anyhow::Result;
use deduce_core::summarize;

use super::{format_amount, load_expenses, truncate, Output};
use crate::cli::InputArgs;

pub fn cmd_summary(input: &InputArgs, output: Output) -> Result<()> {
    let expenses = load_expenses(input)?;
    let summary = summarize(&expenses);

    if output.json {
        return output.print_json(serde_json::to_value(&summary)?);
    }

    println!();
    println!("📊 Expense Summary");
    println!("   ─────────────────────────────────────────────────────────────");

    if summary.count == 0 {
        println!("   No expenses found.");
        return Ok(());
    }

    println!("   Total:          {}", format_amount(summary.total));
    println!(
        "   Deductible:     {} ({} expenses)",
        format_amount(summary.deductible_total),
        summary.deductible_count
    );
    println!("   Non-deductible: {}", format_amount(summary.non_deductible_total));
    println!("   Average:        {:.2}", summary.average / 100.0);
    println!();
    println!(
        "   {:22} │ {:>10} │ {:>10} │ {:>6} │ {:>5}",
        "Category", "Amount", "Deductible", "%", "Count"
    );
    println!("   ───────────────────────┼────────────┼────────────┼────────┼───────");

    for cat in &summary.categories {
        println!(
            "   {:22} │ {:>10} │ {:>10} │ {:>5.1}% │ {:>5}",
            truncate(cat.category.label(), 22),
            format_amount(cat.total),
            format_amount(cat.deductible),
            cat.percentage,
            cat.count
        );
    }

    Ok(())
}

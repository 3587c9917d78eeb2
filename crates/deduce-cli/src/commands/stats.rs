//! Baseline statistics command

use anyhow::Result;
use deduce_core::EngineConfig;

use super::{build_monitor, format_amount, load_expenses, resolve_as_of, Output};
use crate::cli::InputArgs;

pub async fn cmd_stats(config: &EngineConfig, input: &InputArgs, output: Output) -> Result<()> {
    let expenses = load_expenses(input)?;
    let as_of = resolve_as_of(input)?;
    let monitor = build_monitor(config, expenses);

    let window = monitor.baseline_window(as_of);
    let stats = monitor.baseline(as_of).await;

    if output.json {
        let entries: Vec<_> = stats.values().collect();
        return output.print_json(serde_json::to_value(entries)?);
    }

    println!();
    println!("📊 Category Baselines");
    println!("   Window: {} to {}", window.start, window.end);
    println!("   ─────────────────────────────────────────────────────────────");

    if stats.is_empty() {
        println!(
            "   No category has at least {} expenses in this window.",
            config.statistics.min_samples
        );
        return Ok(());
    }

    println!(
        "   {:22} │ {:>5} │ {:>10} │ {:>10} │ {:>10} │ {:>10}",
        "Category", "Count", "Mean", "Std dev", "Min", "Max"
    );
    println!("   ───────────────────────┼───────┼────────────┼────────────┼────────────┼────────────");

    for entry in stats.values() {
        println!(
            "   {:22} │ {:>5} │ {:>10.2} │ {:>10.2} │ {:>10} │ {:>10}",
            entry.category.label(),
            entry.count,
            entry.mean / 100.0,
            entry.std_dev / 100.0,
            format_amount(entry.min),
            format_amount(entry.max)
        );
    }

    Ok(())
}

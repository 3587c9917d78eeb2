//! Trend comparison command

use anyhow::{anyhow, Result};
use deduce_core::{CellSignal, EngineConfig, TrendDirection, TrendReport, TrendWindow};

use super::{build_monitor, format_amount, load_expenses, resolve_as_of, Output};
use crate::cli::InputArgs;

pub async fn cmd_trends(
    config: &EngineConfig,
    input: &InputArgs,
    months: Option<u32>,
    output: Output,
) -> Result<()> {
    let expenses = load_expenses(input)?;
    let as_of = resolve_as_of(input)?;
    let monitor = build_monitor(config, expenses);

    let window = match months {
        Some(m) => TrendWindow::try_from(m).map_err(|e| anyhow!(e))?,
        None => monitor.default_trend_window(),
    };

    let report = monitor
        .trends(window, as_of)
        .await
        .applied()
        .ok_or_else(|| anyhow!("Trend refresh was superseded"))?;

    if output.json {
        return output.print_json(serde_json::to_value(&report)?);
    }

    print_report(&report);
    Ok(())
}

fn direction_label(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Up => "📈 up",
        TrendDirection::Down => "📉 down",
        TrendDirection::Stable => "➖ stable",
    }
}

fn print_report(report: &TrendReport) {
    println!();
    println!("📈 Category Trends (last {} months)", report.window.months());
    if let (Some(first), Some(last)) = (report.months.first(), report.months.last()) {
        println!("   Period: {} to {}", first, last);
    }
    println!("   ─────────────────────────────────────────────────────────────");

    if report.comparisons.is_empty() {
        println!("   No spending data found.");
        return;
    }

    println!(
        "   {:22} │ {:>10} │ {:>10} │ {:10} │ {:>9}",
        "Category", "Total", "Avg/month", "Trend", "Change"
    );
    println!("   ───────────────────────┼────────────┼────────────┼────────────┼───────────");

    for comparison in &report.comparisons {
        let change = comparison
            .variation_percent
            .map(|v| format!("{:+.1}%", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {:22} │ {:>10} │ {:>10.2} │ {:10} │ {:>9}",
            comparison.category.label(),
            format_amount(comparison.total),
            comparison.monthly_average / 100.0,
            direction_label(comparison.direction),
            change
        );
    }

    println!();
    println!("   Monthly totals (↑/↓ = significant change vs previous month)");
    print!("   {:22}", "Category");
    for month in &report.months {
        print!(" │ {:>11}", month.to_string());
    }
    println!();

    for row in &report.table {
        print!("   {:22}", row.category.label());
        for cell in &row.cells {
            let text = match cell.total {
                None => "-".to_string(),
                Some(total) => {
                    let marker = match cell.signal {
                        Some(CellSignal::SignificantIncrease) => "↑",
                        Some(CellSignal::SignificantDecrease) => "↓",
                        _ => " ",
                    };
                    format!("{}{}", format_amount(total), marker)
                }
            };
            print!(" │ {:>11}", text);
        }
        println!();
    }

    if !report.exceptions.is_empty() {
        println!();
        println!("⚠️  Category exceptions");
        for alert in &report.exceptions {
            println!("   • {}", alert.message);
        }
    }
}

//! Category exception polling command

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use deduce_core::{spawn_alert_poller, EngineConfig, LogAlertSink, MemoryAlertSink};
use tracing::info;

use super::{build_monitor, load_expenses, resolve_as_of, Output};
use crate::cli::InputArgs;

/// Poll for category exceptions
///
/// With `once`, runs a single pass for `--as-of` and prints what it found.
/// Otherwise polls at the configured interval until interrupted, logging
/// each new alert.
pub async fn cmd_watch(config: EngineConfig, input: &InputArgs, once: bool, output: Output) -> Result<()> {
    let expenses = load_expenses(input)?;
    let monitor = Arc::new(build_monitor(&config, expenses));

    if once {
        let as_of = resolve_as_of(input)?;
        let sink = MemoryAlertSink::new();
        let mut seen = HashSet::new();
        let summary = monitor.poll_once(&sink, as_of, &mut seen).await;
        let records = sink.records().await;

        if output.json {
            return output.print_json(serde_json::to_value(&records)?);
        }

        println!();
        println!("🔔 Category exceptions as of {}", as_of);
        println!("   ─────────────────────────────────────────────────────────────");
        if records.is_empty() {
            println!("   ✅ No category exceptions.");
        }
        for record in &records {
            println!("   ⚠️  {}: {}", record.record.title, record.record.message);
        }
        if summary.failed > 0 {
            println!("   {} alert(s) could not be delivered", summary.failed);
        }
        return Ok(());
    }

    info!(
        file = %input.file.display(),
        interval_secs = config.monitor.poll_interval_secs,
        "Watching for category exceptions (Ctrl+C to stop)"
    );

    let handle = spawn_alert_poller(monitor, Arc::new(LogAlertSink::new()));
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    handle.abort();

    info!("Stopped watching");
    Ok(())
}

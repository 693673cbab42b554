//! Ledger command - Show the team's change ledger
//!
//! Downloads the selected team's snapshot and prints the devices that sync
//! with it and the create/delete markers still waiting for acknowledgement.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Args;
use stagesync_core::domain::{ChangeLedger, MarkerKind};

use super::{open_engine, plural};
use crate::output::{get_formatter, print_serialized, OutputFormat, OutputFormatter};

/// Ledger command with clap options
#[derive(Debug, Args)]
pub struct LedgerCommand {
    /// Also list every pending marker, not just the counts
    #[arg(long)]
    pub markers: bool,
}

impl LedgerCommand {
    /// Execute the ledger command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let (config, engine) = open_engine(config_path)?;

        let (church, team) = match config.require_team() {
            Ok(selected) => selected,
            Err(e) => {
                formatter.error(&e.to_string());
                return Ok(());
            }
        };

        let Some(ledger) = engine.fetch_remote_ledger(&church, &team).await? else {
            formatter.error(&format!("Team {team} has no readable change ledger"));
            return Ok(());
        };

        if format.is_json() {
            return print_serialized(&*formatter, &ledger);
        }

        formatter.success(&format!(
            "Change ledger of {team} (version {})",
            ledger.version()
        ));
        formatter.info("");
        formatter.info(&format!(
            "{} device{}:",
            ledger.devices().len(),
            plural(ledger.devices().len())
        ));
        for device in ledger.devices() {
            let you = if device == engine.device() { " (this device)" } else { "" };
            let last = ledger
                .modified()
                .get(device)
                .map_or_else(|| "never".to_string(), |ms| format_millis(*ms));
            formatter.info(&format!("  {device}{you}  last sync {last}"));
        }

        formatter.info("");
        print_markers(&*formatter, &ledger, MarkerKind::Created, self.markers);
        print_markers(&*formatter, &ledger, MarkerKind::Deleted, self.markers);
        Ok(())
    }
}

fn print_markers(
    formatter: &dyn OutputFormatter,
    ledger: &ChangeLedger,
    kind: MarkerKind,
    detailed: bool,
) {
    let label = match kind {
        MarkerKind::Created => "Pending creates",
        MarkerKind::Deleted => "Pending deletes",
    };
    formatter.field(label, &ledger.marker_count(kind).to_string());
    if !detailed {
        return;
    }
    for (key, seen_by) in ledger.markers(kind) {
        let seen: Vec<&str> = seen_by.iter().map(|d| d.as_str()).collect();
        formatter.info(&format!("  {key}  seen by {}", seen.join(", ")));
    }
}

/// Renders an epoch-millisecond timestamp in local time
fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

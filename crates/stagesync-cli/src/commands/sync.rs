//! Sync command - Run a sync pass with the selected team
//!
//! Provides the `stagesync sync` CLI command which:
//! 1. Loads configuration and builds the provider
//! 2. Runs one pass with the configured (or overridden) method
//! 3. Waits for the official backup refresh to finish
//! 4. Falls back to merge after a successful one-shot method

use std::path::Path;

use anyhow::Result;
use clap::Args;
use stagesync_core::domain::SyncMethod;
use stagesync_sync::background::ShutdownMode;
use stagesync_sync::{SyncReport, SyncRequest};
use tracing::info;

use super::{open_engine, plural};
use crate::output::{get_formatter, print_serialized, OutputFormat, OutputFormatter};

/// Sync command with clap options
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Method for this pass only (merge, read_only, upload, replace)
    #[arg(long)]
    pub method: Option<SyncMethod>,

    /// Last pass before the application exits; skips the backup refresh
    #[arg(long)]
    pub closing: bool,
}

impl SyncCommand {
    /// Execute the sync command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let (mut config, engine) = open_engine(config_path)?;

        let (church, team) = match config.require_team() {
            Ok(selected) => selected,
            Err(e) => {
                formatter.error(&e.to_string());
                return Ok(());
            }
        };

        let method = self.method.unwrap_or(config.sync.method);
        let request = SyncRequest::new(church, team)
            .with_method(method)
            .closing(self.closing);

        formatter.info(&format!("Syncing with team {} ({method})...", request.team));
        let report = engine.sync_data(&request).await;

        if engine.is_busy() {
            formatter.info("Waiting for the timed-out pass to finish...");
        } else if engine.background().pending() > 0 {
            formatter.info("Waiting for the official backup...");
        }
        engine.shutdown(ShutdownMode::Wait).await;

        if let Some(next) = method_after_pass(config.sync.method, self.method, report.success) {
            info!(from = %config.sync.method, to = %next, "Resetting sync method");
            config.sync.method = next;
            config.save(config_path)?;
        }

        if format.is_json() {
            print_serialized(&*formatter, &report)?;
        } else {
            print_report(&*formatter, &report);
        }
        Ok(())
    }
}

/// Method to store in the configuration after a pass
///
/// One-shot methods taken from the configuration revert to merge once they
/// succeeded. A method given on the command line never touches the file.
fn method_after_pass(
    configured: SyncMethod,
    overridden: Option<SyncMethod>,
    success: bool,
) -> Option<SyncMethod> {
    if overridden.is_some() || !success || !configured.is_one_shot() {
        return None;
    }
    Some(SyncMethod::Merge)
}

fn print_report(formatter: &dyn OutputFormatter, report: &SyncReport) {
    if let Some(error) = &report.error {
        formatter.error(error);
        return;
    }
    if !report.success {
        formatter.error("The provider did not accept the upload");
        return;
    }

    let duration_display = if report.duration_ms >= 1000 {
        format!("{:.1}s", report.duration_ms as f64 / 1000.0)
    } else {
        format!("{}ms", report.duration_ms)
    };

    if report.change_count() == 0 && report.errors.is_empty() {
        formatter.success(&format!("Up to date ({duration_display})"));
    } else {
        formatter.success(&format!("Sync completed in {duration_display}"));
    }

    if report.downloaded > 0 {
        formatter.field("Downloaded", &report.downloaded.to_string());
    }
    if report.uploaded > 0 {
        formatter.field("Kept local", &report.uploaded.to_string());
    }
    if report.deleted > 0 {
        formatter.field("Deleted", &report.deleted.to_string());
    }

    if !report.errors.is_empty() {
        formatter.warn(&format!(
            "{} entit{} could not be synced:",
            report.errors.len(),
            if report.errors.len() == 1 { "y" } else { "ies" }
        ));
        for err in &report.errors {
            formatter.info(&format!("  - {}", err));
        }
    } else if report.change_count() > 0 {
        formatter.info(&format!(
            "{} local change{}",
            report.change_count(),
            plural(report.change_count())
        ));
    }
}

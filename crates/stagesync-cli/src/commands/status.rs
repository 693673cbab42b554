//! Status command - Display connection and local data status
//!
//! Provides the `stagesync status` CLI command which:
//! 1. Shows the device, data directory and selected team
//! 2. Checks that the provider is reachable and the team has a snapshot
//! 3. Shows the newest local rotation archive

use std::path::Path;

use anyhow::Result;
use clap::Args;
use stagesync_sync::rotation::newest_archive;
use tracing::warn;

use super::open_engine;
use crate::output::{get_formatter, OutputFormat};

/// Status command
#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Execute the status command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let (config, engine) = open_engine(config_path)?;

        let reachable = engine.can_sync().await.unwrap_or_else(|e| {
            warn!(error = %e, "Provider check failed");
            false
        });

        let selected = config.require_team().ok();
        let team_data = match (&selected, reachable) {
            (Some((church, team)), true) => Some(engine.has_team_data(church, team).await?),
            _ => None,
        };

        let newest = newest_archive(engine.store()).await?;
        let newest_name = newest
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned());

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "device": engine.device().as_str(),
                "data_dir": engine.store().root().display().to_string(),
                "method": config.sync.method,
                "church": selected.as_ref().map(|(church, _)| church.as_str()),
                "team": selected.as_ref().map(|(_, team)| team.as_str()),
                "provider_reachable": reachable,
                "team_has_snapshot": team_data,
                "newest_archive": newest_name,
            }));
            return Ok(());
        }

        formatter.success("stagesync status");
        formatter.field("Device", engine.device().as_str());
        formatter.field("Data", &engine.store().root().display().to_string());
        formatter.field("Method", config.sync.method.as_str());
        match &selected {
            Some((church, team)) => formatter.field("Team", &format!("{church}/{team}")),
            None => formatter.field("Team", "none selected"),
        }
        formatter.field(
            "Provider",
            if reachable { "reachable" } else { "unreachable" },
        );
        if let Some(has_data) = team_data {
            formatter.field(
                "Snapshot",
                if has_data { "present" } else { "none uploaded yet" },
            );
        }
        formatter.field(
            "Last archive",
            newest_name.as_deref().unwrap_or("none"),
        );
        Ok(())
    }
}

//! Teams command - List the provider's teams or select one
//!
//! Provides the `stagesync teams` CLI command which:
//! 1. Lists every team the provider offers, marking the selected one
//! 2. With `--select`, stores a team as the sync target

use std::path::Path;

use anyhow::Result;
use clap::Args;
use stagesync_core::ports::Team;
use tracing::info;

use super::{open_engine, plural};
use crate::output::{get_formatter, OutputFormat};

/// Teams command with clap options
#[derive(Debug, Args)]
pub struct TeamsCommand {
    /// Team to sync with, as `<team>` or `<church>/<team>`
    #[arg(long, value_name = "TEAM")]
    pub select: Option<String>,
}

impl TeamsCommand {
    /// Execute the teams command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let (mut config, engine) = open_engine(config_path)?;

        if !engine.can_sync().await? {
            formatter.error("Provider is not reachable; check provider.remote_root");
            return Ok(());
        }
        let teams = engine.list_teams().await?;

        if let Some(selector) = &self.select {
            let Some(team) = find_team(&teams, selector) else {
                formatter.error(&format!("No team matches '{selector}'"));
                return Ok(());
            };
            info!(church = %team.church_id, team = %team.id, "Selecting team");
            config.provider.church_id = Some(team.church_id.clone());
            config.provider.team_id = Some(team.id.clone());
            config.save(config_path)?;

            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": true,
                    "church": team.church_id.as_str(),
                    "team": team.id.as_str(),
                    "name": team.name,
                }));
            } else {
                formatter.success(&format!("Selected team {} ({})", team.name, team.id));
            }
            return Ok(());
        }

        let selected = config.provider.team_id.as_ref();
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "teams": teams,
                "selected": selected.map(|t| t.as_str()),
            }));
            return Ok(());
        }

        if teams.is_empty() {
            formatter.info("No teams found under the provider root");
            return Ok(());
        }
        formatter.success(&format!("{} team{}", teams.len(), plural(teams.len())));
        for team in &teams {
            let marker = if Some(&team.id) == selected { "*" } else { " " };
            formatter.info(&format!(
                "{marker} {}/{}  {}",
                team.church_id, team.id, team.name
            ));
        }
        Ok(())
    }
}

/// Finds a team by `<team>` or `<church>/<team>`
///
/// A bare team id only matches when it is unique across churches.
fn find_team<'a>(teams: &'a [Team], selector: &str) -> Option<&'a Team> {
    if let Some((church, team)) = selector.split_once('/') {
        return teams
            .iter()
            .find(|t| t.church_id.as_str() == church && t.id.as_str() == team);
    }

    let mut matches = teams.iter().filter(|t| t.id.as_str() == selector);
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first)
}

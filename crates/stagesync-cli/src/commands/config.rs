//! Config command - View and manage stagesync configuration
//!
//! Provides the `stagesync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use stagesync_core::config::Config;
use tracing::info;

use super::plural;
use crate::output::{get_formatter, OutputFormat};

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.data_dir", "Local data store directory"),
    ("sync.scratch_dir", "Scratch directory, wiped every pass"),
    ("sync.method", "merge|read_only|upload|replace"),
    ("sync.timeout_secs", "Seconds before a pass is abandoned"),
    ("sync.keep_scratch", "Keep the scratch directory (true|false)"),
    ("provider.kind", "Remote storage provider (folder)"),
    ("provider.remote_root", "Folder provider root directory"),
    ("provider.church_id", "Church of the selected team"),
    ("provider.team_id", "Selected team"),
    ("device.id", "Device id override, or none"),
    ("device.name", "Device display name, or none"),
    ("backup.max_age_days", "Days before the official backup is refreshed"),
    ("backup.fresh_minutes", "Archives younger than this are replaced"),
    ("backup.keep_newest", "Rotation archives always kept"),
    ("backup.max_rotation_age_days", "Days before rotation archives expire"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "Log as JSON lines (true|false)"),
];

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.method")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format, config_path),
            ConfigCommand::Set { key, value } => {
                self.execute_set(key, value, format, config_path)
            }
            ConfigCommand::Validate => self.execute_validate(format, config_path),
        }
    }

    /// Show current configuration
    fn execute_show(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let config = Config::load_or_default(config_path);

        info!(config_path = %config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;

            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    /// Set a configuration value using dot-notation
    fn execute_set(
        &self,
        key: &str,
        value: &str,
        format: OutputFormat,
        config_path: &Path,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let mut config = Config::load_or_default(config_path);

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (key, description) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {key:<30} - {description}"));
                }
            }
            return Ok(());
        }

        // The provider root is usually set after other keys; don't block on it
        let error_msgs: Vec<String> = config
            .validate()
            .iter()
            .filter(|e| e.field != "provider.remote_root" || key == "provider.remote_root")
            .map(|e| e.to_string())
            .collect();

        if !error_msgs.is_empty() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": error_msgs,
                }));
            } else {
                formatter.error(&format!(
                    "Invalid value for '{}': {}",
                    key,
                    error_msgs.join("; ")
                ));
            }
            return Ok(());
        }

        config.save(config_path)?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, value));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    /// Validate configuration file
    fn execute_validate(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);

        // Load explicitly so parse errors are reported instead of defaulted
        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                let message = if config_path.exists() {
                    format!("Failed to parse configuration: {}", e)
                } else {
                    "Configuration file not found. Using defaults.".to_string()
                };
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [message],
                    }));
                } else if config_path.exists() {
                    formatter.error(&message);
                    formatter.info(&format!("File: {}", config_path.display()));
                } else {
                    formatter.info(&format!(
                        "Configuration file not found at {}",
                        config_path.display()
                    ));
                    formatter.info(
                        "Run 'stagesync config set <key> <value>' to create one.",
                    );
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");

        let errors = config.validate();

        if format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                plural(errors.len())
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

/// Parses an optional value where `none` or an empty string clears it
fn optional<T>(value: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if value.is_empty() || value == "none" {
        return Ok(None);
    }
    Ok(Some(value.parse::<T>()?))
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.data_dir" => {
            config.sync.data_dir = PathBuf::from(value);
        }
        "sync.scratch_dir" => {
            config.sync.scratch_dir = PathBuf::from(value);
        }
        "sync.method" => {
            config.sync.method = value.parse().context("Unknown sync method")?;
        }
        "sync.timeout_secs" => {
            config.sync.timeout_secs = value
                .parse::<u64>()
                .context("Expected a positive integer for sync.timeout_secs")?;
        }
        "sync.keep_scratch" => {
            config.sync.keep_scratch = value
                .parse::<bool>()
                .context("Expected true or false")?;
        }

        // --- provider ---
        "provider.kind" => {
            config.provider.kind = value.parse()?;
        }
        "provider.remote_root" => {
            config.provider.remote_root = optional::<PathBuf>(value)?;
        }
        "provider.church_id" => {
            config.provider.church_id = optional(value)?;
        }
        "provider.team_id" => {
            config.provider.team_id = optional(value)?;
        }

        // --- device ---
        "device.id" => {
            config.device.id = optional(value)?;
        }
        "device.name" => {
            config.device.name = optional::<String>(value)?;
        }

        // --- backup ---
        "backup.max_age_days" => {
            config.backup.max_age_days = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }
        "backup.fresh_minutes" => {
            config.backup.fresh_minutes = value
                .parse::<u64>()
                .context("Expected a positive integer")?;
        }
        "backup.keep_newest" => {
            config.backup.keep_newest = value
                .parse::<usize>()
                .context("Expected a positive integer")?;
        }
        "backup.max_rotation_age_days" => {
            config.backup.max_rotation_age_days = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }

        // --- logging ---
        "logging.level" => {
            config.logging.level = value.to_string();
        }
        "logging.json" => {
            config.logging.json = value
                .parse::<bool>()
                .context("Expected true or false")?;
        }

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}

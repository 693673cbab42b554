//! Device command - Show this installation's identity
//!
//! The device id is what the change ledger records; it comes from the
//! configuration when set, otherwise from the machine id.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use stagesync_core::config::Config;
use stagesync_core::domain::device::{local_device_name, resolve_device_id};

use crate::output::{get_formatter, OutputFormat};

/// Device command
#[derive(Debug, Args)]
pub struct DeviceCommand {}

impl DeviceCommand {
    /// Execute the device command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let config = Config::load_or_default(config_path);

        let id = resolve_device_id(config.device.id.as_ref());
        let name = config.device.name.clone().unwrap_or_else(local_device_name);
        let source = if config.device.id.is_some() {
            "configuration"
        } else {
            "machine"
        };

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "id": id.as_str(),
                "name": name,
                "source": source,
            }));
        } else {
            formatter.success(&format!("Device {name}"));
            formatter.field("Id", id.as_str());
            formatter.field("From", source);
        }
        Ok(())
    }
}

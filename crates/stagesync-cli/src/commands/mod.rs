//! CLI subcommands

pub mod completions;
pub mod config;
pub mod device;
pub mod ledger;
pub mod status;
pub mod sync;
pub mod teams;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use stagesync_core::config::Config;
use stagesync_provider::create_provider;
use stagesync_sync::notifier::TracingNotifier;
use stagesync_sync::SyncEngine;
use tracing::info;

/// Loads the configuration and builds an engine wired to its provider
pub(crate) fn open_engine(config_path: &Path) -> Result<(Config, Arc<SyncEngine>)> {
    let config = Config::load_or_default(config_path);
    info!(config_path = %config_path.display(), "Loaded configuration");
    check_config(&config)?;

    let provider = create_provider(&config.provider).context("Failed to set up provider")?;
    let engine = SyncEngine::from_config(&config, provider, Arc::new(TracingNotifier::new()));
    Ok((config, Arc::new(engine)))
}

/// Refuses a configuration the engine cannot safely run with
///
/// A missing provider root is left to [`create_provider`], which reports it
/// in terms of the chosen provider.
pub(crate) fn check_config(config: &Config) -> Result<()> {
    let errors: Vec<String> = config
        .validate()
        .iter()
        .filter(|e| e.field != "provider.remote_root" || config.provider.remote_root.is_some())
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        bail!("Invalid configuration: {}", errors.join("; "));
    }
    Ok(())
}

/// "s" unless `count` is one
pub(crate) fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

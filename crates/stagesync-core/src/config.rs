//! Configuration module for stagesync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, saving, validation, defaults, and a builder pattern for
//! programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::{ChurchRef, DeviceId, SyncMethod, TeamRef};
use crate::ports::ProviderId;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for stagesync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub provider: ProviderConfig,
    pub device: DeviceConfig,
    pub backup: BackupConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of the local store (`<STORE>.json`, `shows/`, `scriptures/`, `cloud/`).
    pub data_dir: PathBuf,
    /// Scratch directory snapshots are extracted into; wiped every pass.
    pub scratch_dir: PathBuf,
    /// Method used by the next pass.
    pub method: SyncMethod,
    /// Wall-clock budget for one pass, enforced by the caller.
    pub timeout_secs: u64,
    /// Keep the scratch directory after a pass and skip the background backup.
    pub keep_scratch: bool,
}

/// Remote storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Which provider integration to use.
    pub kind: ProviderId,
    /// Root directory of the folder provider.
    pub remote_root: Option<PathBuf>,
    /// Church owning the team. `None` until the user picks a team.
    pub church_id: Option<ChurchRef>,
    /// Team to sync with.
    pub team_id: Option<TeamRef>,
}

/// Device identity overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Pinned device id; derived from the machine when unset.
    pub id: Option<DeviceId>,
    /// Display name; the host's device name when unset.
    pub name: Option<String>,
}

/// Backup rotation and official backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Re-upload the official backup once it is older than this many days.
    pub max_age_days: u32,
    /// Rotation archives younger than this are treated as partial writes.
    pub fresh_minutes: u64,
    /// Number of newest rotation archives always kept.
    pub keep_newest: usize,
    /// Rotation archives older than this many days are removed.
    pub max_rotation_age_days: u32,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load() / save()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration to `path`, creating parent directories.
    ///
    /// The file is written to a sibling temp file first and renamed into
    /// place so a crash never leaves a truncated config behind.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let yaml = serde_yaml::to_string(self).context("Failed to serialize configuration")?;
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/stagesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("stagesync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("stagesync"),
            scratch_dir: std::env::temp_dir().join("stagesync-cloud"),
            method: SyncMethod::Merge,
            timeout_secs: 300,
            keep_scratch: false,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_age_days: 7,
            fresh_minutes: 60,
            keep_newest: 2,
            max_rotation_age_days: 14,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.timeout_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Team selection is
    /// not checked here; see [`Config::require_team`].
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "sync.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        // The scratch dir is wiped every pass, so neither may contain the other.
        if self.sync.scratch_dir.starts_with(&self.sync.data_dir) {
            errors.push(ValidationError {
                field: "sync.scratch_dir".into(),
                message: "must not be sync.data_dir or inside it (it is wiped every pass)".into(),
            });
        } else if self.sync.data_dir.starts_with(&self.sync.scratch_dir) {
            errors.push(ValidationError {
                field: "sync.scratch_dir".into(),
                message: "must not contain sync.data_dir (it is wiped every pass)".into(),
            });
        }

        // --- provider ---
        match (&self.provider.kind, &self.provider.remote_root) {
            (ProviderId::Folder, None) => errors.push(ValidationError {
                field: "provider.remote_root".into(),
                message: "required by the folder provider".into(),
            }),
            (ProviderId::Folder, Some(root)) if root.starts_with(&self.sync.data_dir) => {
                errors.push(ValidationError {
                    field: "provider.remote_root".into(),
                    message: "must not be inside sync.data_dir".into(),
                })
            }
            _ => {}
        }

        // --- backup ---
        if self.backup.max_age_days == 0 {
            errors.push(ValidationError {
                field: "backup.max_age_days".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.backup.max_rotation_age_days == 0 {
            errors.push(ValidationError {
                field: "backup.max_rotation_age_days".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.backup.fresh_minutes >= u64::from(self.backup.max_rotation_age_days) * 24 * 60 {
            errors.push(ValidationError {
                field: "backup.fresh_minutes".into(),
                message: format!(
                    "fresh_minutes ({}) must be shorter than max_rotation_age_days ({})",
                    self.backup.fresh_minutes, self.backup.max_rotation_age_days
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }

    /// Church and team the next pass targets.
    ///
    /// # Errors
    /// Returns an error naming the missing key when no team was selected.
    pub fn require_team(&self) -> anyhow::Result<(ChurchRef, TeamRef)> {
        let church = self
            .provider
            .church_id
            .clone()
            .context("provider.church_id is not set; pick a team with `stagesync teams`")?;
        let team = self
            .provider
            .team_id
            .clone()
            .context("provider.team_id is not set; pick a team with `stagesync teams`")?;
        Ok((church, team))
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use stagesync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .data_dir(PathBuf::from("/home/user/.local/share/stagesync"))
///     .remote_root(PathBuf::from("/mnt/nas/stagesync"))
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.sync.data_dir = dir;
        self
    }

    pub fn scratch_dir(mut self, dir: PathBuf) -> Self {
        self.config.sync.scratch_dir = dir;
        self
    }

    pub fn method(mut self, method: SyncMethod) -> Self {
        self.config.sync.method = method;
        self
    }

    pub fn timeout_secs(mut self, seconds: u64) -> Self {
        self.config.sync.timeout_secs = seconds;
        self
    }

    pub fn keep_scratch(mut self, keep: bool) -> Self {
        self.config.sync.keep_scratch = keep;
        self
    }

    // --- provider ---

    pub fn remote_root(mut self, root: PathBuf) -> Self {
        self.config.provider.remote_root = Some(root);
        self
    }

    pub fn team(mut self, church: ChurchRef, team: TeamRef) -> Self {
        self.config.provider.church_id = Some(church);
        self.config.provider.team_id = Some(team);
        self
    }

    // --- device ---

    pub fn device_id(mut self, id: DeviceId) -> Self {
        self.config.device.id = Some(id);
        self
    }

    // --- backup ---

    pub fn backup_max_age_days(mut self, days: u32) -> Self {
        self.config.backup.max_age_days = days;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

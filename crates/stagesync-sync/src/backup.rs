//! Official remote backup refresh
//!
//! Besides the live snapshot, each team keeps one official backup archive on
//! the remote. After an upload the engine checks its age and replaces it with
//! the newest local rotation archive once it is stale.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stagesync_core::config::BackupConfig;
use stagesync_core::domain::{ChurchRef, TeamRef};
use stagesync_core::ports::ISyncProvider;
use tracing::{debug, info, instrument};

use crate::rotation::newest_archive;
use crate::store::{file_state, LocalDataStore};
use crate::SyncError;

/// When the official backup is replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupPolicy {
    /// Replace the backup once it is older than this
    pub max_age: Duration,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl From<&BackupConfig> for BackupPolicy {
    fn from(config: &BackupConfig) -> Self {
        Self {
            max_age: Duration::from_secs(u64::from(config.max_age_days) * 24 * 60 * 60),
        }
    }
}

/// Outcome of a backup refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The remote backup is recent enough
    Fresh,
    /// No local rotation archive exists to upload
    NothingToUpload,
    /// The backup was replaced
    Uploaded,
    /// The provider refused the archive
    Rejected,
}

/// Replaces the team's official backup if it is missing or stale
///
/// # Arguments
/// * `provider` - Remote storage
/// * `store` - Local store whose newest rotation archive gets uploaded
/// * `church` / `team` - The team whose backup to check
/// * `scratch` - Where the current backup is downloaded to; left in place
/// * `policy` - Maximum backup age
#[instrument(skip(provider, store, policy), fields(team = %team))]
pub async fn refresh_backup(
    provider: Arc<dyn ISyncProvider>,
    store: &LocalDataStore,
    church: &ChurchRef,
    team: &TeamRef,
    scratch: &Path,
    policy: &BackupPolicy,
) -> Result<BackupOutcome, SyncError> {
    tokio::fs::create_dir_all(scratch).await?;
    let current = provider
        .fetch_backup(church, team, scratch)
        .await
        .map_err(SyncError::ProviderError)?;

    let stale = match current {
        None => {
            debug!("team has no official backup");
            true
        }
        Some(path) => match file_state(&path).await?.modified {
            None => true,
            Some(modified) => {
                let age = (Utc::now() - modified).to_std().unwrap_or(Duration::ZERO);
                debug!(age_secs = age.as_secs(), "official backup age");
                age > policy.max_age
            }
        },
    };

    if !stale {
        return Ok(BackupOutcome::Fresh);
    }

    let Some(archive) = newest_archive(store).await? else {
        debug!("no rotation archive to upload as backup");
        return Ok(BackupOutcome::NothingToUpload);
    };

    let accepted = provider
        .upload_backup(team, &archive)
        .await
        .map_err(SyncError::ProviderError)?;

    if accepted {
        info!(archive = %archive.display(), "Official backup replaced");
        Ok(BackupOutcome::Uploaded)
    } else {
        Ok(BackupOutcome::Rejected)
    }
}

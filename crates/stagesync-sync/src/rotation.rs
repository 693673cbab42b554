//! Local rotation archive cleanup
//!
//! Every upload also leaves a copy of the snapshot in the data directory's
//! `cloud/` folder. This module keeps that folder from growing forever while
//! guaranteeing a couple of recent archives survive.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use stagesync_core::config::BackupConfig;
use tracing::{debug, info, instrument, warn};

use crate::store::LocalDataStore;
use crate::SyncError;

const ARCHIVE_EXTENSION: &str = "zip";

/// Rules deciding which rotation archives are deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Archives younger than this are treated as partial writes and removed
    pub fresh: Duration,
    /// Number of leading candidates that are never removed for being old
    pub keep_newest: usize,
    /// Archives older than this are removed
    pub max_age: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            fresh: Duration::from_secs(60 * 60),
            keep_newest: 2,
            max_age: Duration::from_secs(14 * 24 * 60 * 60),
        }
    }
}

impl From<&BackupConfig> for RotationPolicy {
    fn from(config: &BackupConfig) -> Self {
        Self {
            fresh: Duration::from_secs(config.fresh_minutes * 60),
            keep_newest: config.keep_newest,
            max_age: Duration::from_secs(u64::from(config.max_rotation_age_days) * 24 * 60 * 60),
        }
    }
}

/// A rotation archive and how old it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationCandidate {
    /// Location of the archive inside the rotation directory
    pub path: PathBuf,
    /// Time since the archive was last modified
    pub age: Duration,
}

/// Picks the archives to delete
///
/// Candidates must be ordered newest first. The fresh rule is checked before
/// the keep rule, so a partial write in the first slots is still removed and
/// still uses up a slot.
pub fn select_for_deletion(
    policy: &RotationPolicy,
    candidates: &[RotationCandidate],
) -> Vec<PathBuf> {
    candidates
        .iter()
        .enumerate()
        .filter(|(index, candidate)| {
            if candidate.age < policy.fresh {
                return true;
            }
            if *index < policy.keep_newest {
                return false;
            }
            candidate.age > policy.max_age
        })
        .map(|(_, candidate)| candidate.path.clone())
        .collect()
}

fn created_or_modified(metadata: &std::fs::Metadata) -> Option<SystemTime> {
    metadata.created().or_else(|_| metadata.modified()).ok()
}

/// Lists rotation archives newest first, with the time used for ordering
async fn list_archives(
    store: &LocalDataStore,
    folder: &Path,
) -> Result<Vec<(PathBuf, SystemTime)>, SyncError> {
    let mut archives = Vec::new();
    for name in store.list_files(folder, Some(ARCHIVE_EXTENSION)).await? {
        let path = folder.join(name);
        let metadata = tokio::fs::metadata(&path).await?;
        if let Some(time) = created_or_modified(&metadata) {
            archives.push((path, time));
        }
    }
    archives.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(archives)
}

/// Deletes old rotation archives
///
/// # Arguments
/// * `store` - Local data store owning the rotation folder
/// * `just_written` - The archive produced by this pass; never a candidate
/// * `policy` - Deletion rules
///
/// # Returns
/// The deleted archives
#[instrument(skip(store, policy))]
pub async fn rotate(
    store: &LocalDataStore,
    just_written: &Path,
    policy: &RotationPolicy,
) -> Result<Vec<PathBuf>, SyncError> {
    let folder = store.rotation_dir();
    let now = SystemTime::now();

    let candidates: Vec<RotationCandidate> = list_archives(store, &folder)
        .await?
        .into_iter()
        .filter(|(path, _)| path != just_written)
        .map(|(path, time)| RotationCandidate {
            path,
            age: now.duration_since(time).unwrap_or(Duration::ZERO),
        })
        .collect();

    let doomed = select_for_deletion(policy, &candidates);
    for path in &doomed {
        if let Err(e) = store.remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Could not delete rotation archive");
        }
    }

    if doomed.is_empty() {
        debug!(kept = candidates.len(), "no rotation archives to delete");
    } else {
        info!(deleted = doomed.len(), kept = candidates.len() - doomed.len(), "Rotated local archives");
    }
    Ok(doomed)
}

/// Newest rotation archive, if any
pub async fn newest_archive(store: &LocalDataStore) -> Result<Option<PathBuf>, SyncError> {
    Ok(list_archives(store, &store.rotation_dir())
        .await?
        .into_iter()
        .next()
        .map(|(path, _)| path))
}

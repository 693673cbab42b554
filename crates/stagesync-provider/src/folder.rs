//! FolderProvider - ISyncProvider implementation over a shared directory
//!
//! Any directory every device can reach (a NAS share, a mounted cloud drive,
//! or a local folder for testing) can host team snapshots:
//!
//! ```text
//! <root>/<church>/<team>/
//!   data.zip     latest snapshot
//!   backup.zip   official backup
//!   team.json    optional, `{"name": "..."}`
//! ```
//!
//! ## Design Notes
//!
//! - Uploads copy to a temporary sibling and rename, so readers never see a
//!   half-written archive. The archive's modification time is the upload
//!   time.
//! - Downloads keep the remote modification time, which is how backup age
//!   is measured.
//! - `has_changed` compares the snapshot's modification time with the one
//!   seen at the last fetch or upload through this instance.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use stagesync_core::domain::newtypes::{ChurchRef, TeamRef};
use stagesync_core::ports::{ISyncProvider, ProviderId, Team};

/// File name of the latest snapshot inside a team directory
pub const SNAPSHOT_FILE: &str = "data.zip";

/// File name of the official backup inside a team directory
pub const BACKUP_FILE: &str = "backup.zip";

/// Optional team metadata inside a team directory
pub const TEAM_INFO_FILE: &str = "team.json";

#[derive(Debug, Deserialize)]
struct TeamInfo {
    name: Option<String>,
}

// ============================================================================
// FolderProvider
// ============================================================================

/// Provider that keeps team archives in a directory tree
#[derive(Debug)]
pub struct FolderProvider {
    root: PathBuf,
    seen: Mutex<HashMap<(String, String), SystemTime>>,
}

impl FolderProvider {
    /// Creates a provider rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a team
    pub fn team_dir(&self, church: &ChurchRef, team: &TeamRef) -> PathBuf {
        self.root.join(church.as_str()).join(team.as_str())
    }

    fn seen_key(church: &ChurchRef, team: &TeamRef) -> (String, String) {
        (church.as_str().to_string(), team.as_str().to_string())
    }

    fn remember(&self, church: &ChurchRef, team: &TeamRef, modified: SystemTime) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(Self::seen_key(church, team), modified);
        }
    }

    fn last_seen(&self, church: &ChurchRef, team: &TeamRef) -> Option<SystemTime> {
        self.seen
            .lock()
            .ok()
            .and_then(|seen| seen.get(&Self::seen_key(church, team)).copied())
    }

    /// Finds the church a team belongs to by scanning the root
    async fn find_team_dir(&self, team: &TeamRef) -> Result<Option<(ChurchRef, PathBuf)>> {
        for church in list_dirs(&self.root).await? {
            let dir = self.root.join(&church).join(team.as_str());
            if tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
                let church = match church.parse::<ChurchRef>() {
                    Ok(church) => church,
                    Err(_) => continue,
                };
                return Ok(Some((church, dir)));
            }
        }
        Ok(None)
    }

    /// Reads a team's display name, falling back to its id
    async fn team_name(&self, dir: &Path, team: &TeamRef) -> String {
        let info = match tokio::fs::read(dir.join(TEAM_INFO_FILE)).await {
            Ok(bytes) => serde_json::from_slice::<TeamInfo>(&bytes).ok(),
            Err(_) => None,
        };
        info.and_then(|info| info.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| team.as_str().to_string())
    }

    /// Copies a team archive out, keeping its modification time
    async fn fetch_file(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
        file: &str,
        dest_dir: &Path,
    ) -> Result<Option<(PathBuf, SystemTime)>> {
        let source = self.team_dir(church, team).join(file);
        let modified = match tokio::fs::metadata(&source).await {
            Ok(metadata) => metadata.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file, "team archive not found");
                return Ok(None);
            }
            Err(e) => return Err(e).context("Failed to stat team archive"),
        };

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(file);
        tokio::fs::copy(&source, &dest)
            .await
            .with_context(|| format!("Failed to copy {}", source.display()))?;
        set_modified(&dest, modified).await?;
        Ok(Some((dest, modified)))
    }

    /// Publishes an archive into a team directory
    async fn upload_file(&self, team: &TeamRef, archive: &Path, file: &str) -> Result<bool> {
        let Some((church, dir)) = self.find_team_dir(team).await? else {
            warn!(team = %team, "Team directory not found under provider root");
            return Ok(false);
        };

        let target = dir.join(file);
        let tmp = dir.join(format!("{file}.tmp"));
        tokio::fs::copy(archive, &tmp)
            .await
            .with_context(|| format!("Failed to copy {}", archive.display()))?;
        set_modified(&tmp, SystemTime::now()).await?;
        tokio::fs::rename(&tmp, &target)
            .await
            .context("Failed to move archive into place")?;

        if file == SNAPSHOT_FILE {
            let modified = tokio::fs::metadata(&target).await?.modified()?;
            self.remember(&church, team, modified);
        }
        Ok(true)
    }
}

// ============================================================================
// ISyncProvider implementation
// ============================================================================

#[async_trait::async_trait]
impl ISyncProvider for FolderProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Folder
    }

    async fn has_valid_connection(&self) -> Result<bool> {
        Ok(tokio::fs::metadata(&self.root)
            .await
            .is_ok_and(|m| m.is_dir()))
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list_teams(&self) -> Result<Vec<Team>> {
        let mut teams = Vec::new();
        for church_name in list_dirs(&self.root).await? {
            let Ok(church) = church_name.parse::<ChurchRef>() else {
                warn!(dir = %church_name, "Skipping church directory with unusable name");
                continue;
            };
            let church_dir = self.root.join(&church_name);
            for team_name in list_dirs(&church_dir).await? {
                let Ok(team) = team_name.parse::<TeamRef>() else {
                    warn!(dir = %team_name, "Skipping team directory with unusable name");
                    continue;
                };
                let name = self.team_name(&church_dir.join(&team_name), &team).await;
                teams.push(Team {
                    id: team,
                    church_id: church.clone(),
                    name,
                });
            }
        }
        debug!(count = teams.len(), "teams listed");
        Ok(teams)
    }

    async fn existing_data(&self, church: &ChurchRef, team: &TeamRef) -> Result<bool> {
        let path = self.team_dir(church, team).join(SNAPSHOT_FILE);
        Ok(tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()))
    }

    async fn has_changed(&self, church: &ChurchRef, team: &TeamRef) -> Result<bool> {
        let path = self.team_dir(church, team).join(SNAPSHOT_FILE);
        let modified = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(self.last_seen(church, team) != Some(modified))
    }

    #[instrument(skip(self, dest_dir), fields(church = %church, team = %team))]
    async fn fetch_snapshot(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let fetched = self.fetch_file(church, team, SNAPSHOT_FILE, dest_dir).await?;
        Ok(fetched.map(|(path, modified)| {
            self.remember(church, team, modified);
            debug!(path = %path.display(), "snapshot fetched");
            path
        }))
    }

    #[instrument(skip(self, archive), fields(team = %team))]
    async fn upload_snapshot(&self, team: &TeamRef, archive: &Path) -> Result<bool> {
        self.upload_file(team, archive, SNAPSHOT_FILE).await
    }

    #[instrument(skip(self, dest_dir), fields(church = %church, team = %team))]
    async fn fetch_backup(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let fetched = self.fetch_file(church, team, BACKUP_FILE, dest_dir).await?;
        Ok(fetched.map(|(path, _)| path))
    }

    #[instrument(skip(self, archive), fields(team = %team))]
    async fn upload_backup(&self, team: &TeamRef, archive: &Path) -> Result<bool> {
        self.upload_file(team, archive, BACKUP_FILE).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Names of the subdirectories of `dir`, sorted; a missing dir is empty
async fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).context("Failed to list provider directory"),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

async fn set_modified(path: &Path, time: SystemTime) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)?
            .set_modified(time)
    })
    .await??;
    Ok(())
}

//! Sync provider port (driven/secondary port)
//!
//! This module defines the interface a remote storage integration must
//! implement to host team snapshots. The remote side is opaque: the engine
//! only ever exchanges whole archives with it.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification.
//! - Uses `#[async_trait]` for async trait methods.
//! - "Not found" is not an error: fetch operations return `Ok(None)` when the
//!   team has no snapshot or backup yet.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;
use crate::domain::newtypes::{ChurchRef, TeamRef};

// ============================================================================
// Provider identity
// ============================================================================

/// Registered provider integrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// A directory (local, NAS or mounted drive) acting as team storage
    #[default]
    Folder,
}

impl ProviderId {
    /// Every provider id, for help texts and validation
    pub const ALL: &'static [ProviderId] = &[ProviderId::Folder];

    /// Config spelling of the id
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Folder => "folder",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .iter()
            .find(|id| id.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::ValidationFailed(format!("Unknown provider: {s}")))
    }
}

// ============================================================================
// Team listing
// ============================================================================

/// A team the current connection can sync with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    /// Team identifier
    pub id: TeamRef,
    /// Church the team belongs to
    pub church_id: ChurchRef,
    /// Display name
    pub name: String,
}

// ============================================================================
// ISyncProvider trait
// ============================================================================

/// Port trait for remote snapshot storage
///
/// ## Implementation Notes
///
/// - `fetch_*` methods write the archive somewhere inside `dest_dir` and
///   return its path. The returned file's modification time must be the
///   remote upload time so backup age checks work.
/// - `upload_*` methods return `Ok(false)` when the remote rejected the
///   archive and `Err` only for transport failures.
#[async_trait::async_trait]
pub trait ISyncProvider: Send + Sync {
    /// Which integration this is
    fn id(&self) -> ProviderId;

    /// Checks whether the provider is reachable and authorised
    async fn has_valid_connection(&self) -> anyhow::Result<bool>;

    /// Lists the teams available to this connection
    async fn list_teams(&self) -> anyhow::Result<Vec<Team>>;

    /// Checks whether the team has any snapshot stored
    async fn existing_data(&self, church: &ChurchRef, team: &TeamRef) -> anyhow::Result<bool>;

    /// Checks whether the team's snapshot changed since this provider last saw it
    async fn has_changed(&self, church: &ChurchRef, team: &TeamRef) -> anyhow::Result<bool>;

    /// Downloads the latest team snapshot
    ///
    /// # Arguments
    /// * `church` - Church owning the team
    /// * `team` - The team whose snapshot to fetch
    /// * `dest_dir` - Directory to place the archive in
    ///
    /// # Returns
    /// The archive path, or `None` if the team has never uploaded
    async fn fetch_snapshot(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
        dest_dir: &Path,
    ) -> anyhow::Result<Option<PathBuf>>;

    /// Publishes a snapshot as the team's latest
    async fn upload_snapshot(&self, team: &TeamRef, archive: &Path) -> anyhow::Result<bool>;

    /// Downloads the team's official backup archive
    async fn fetch_backup(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
        dest_dir: &Path,
    ) -> anyhow::Result<Option<PathBuf>>;

    /// Replaces the team's official backup archive
    async fn upload_backup(&self, team: &TeamRef, archive: &Path) -> anyhow::Result<bool>;
}

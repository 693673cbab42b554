//! Shared test helpers for provider integration tests
//!
//! Builds a provider root holding one church with one team and gives each
//! simulated device its own scratch directory.

use std::path::PathBuf;
use std::sync::Arc;

use stagesync_core::domain::newtypes::{ChurchRef, TeamRef};
use stagesync_core::ports::ISyncProvider;
use stagesync_provider::FolderProvider;
use tempfile::TempDir;

/// A provider root with church `c1` and team `t1`
pub struct TeamFixture {
    pub dir: TempDir,
    pub church: ChurchRef,
    pub team: TeamRef,
}

impl TeamFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("remote").join("c1").join("t1")).unwrap();
        Self {
            dir,
            church: "c1".parse().unwrap(),
            team: "t1".parse().unwrap(),
        }
    }

    /// A fresh provider instance, as each device would hold
    pub fn provider(&self) -> Arc<dyn ISyncProvider> {
        Arc::new(FolderProvider::new(self.dir.path().join("remote")))
    }

    /// Scratch directory of a simulated device
    pub fn scratch(&self, device: &str) -> PathBuf {
        self.dir.path().join(format!("scratch-{device}"))
    }

    /// Writes an archive file to upload
    pub fn archive(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

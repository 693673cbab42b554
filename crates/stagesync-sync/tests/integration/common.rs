//! Shared test helpers for multi-device sync tests
//!
//! A [`TeamFixture`] owns a temporary directory holding the provider root
//! plus one data and scratch directory per simulated device.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tempfile::TempDir;

use stagesync_core::domain::{ChangeLedger, ChurchRef, DeviceId, StoreId, SyncMethod, TeamRef};
use stagesync_core::ports::{INotificationService, Notification};
use stagesync_provider::FolderProvider;
use stagesync_sync::{EngineSettings, SyncEngine, SyncReport, SyncRequest};

/// Notifier that remembers which stores were reported as changed
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub stores: Mutex<Vec<String>>,
    pub show_reloads: Mutex<usize>,
}

#[async_trait::async_trait]
impl INotificationService for RecordingNotifier {
    async fn notify(&self, _notification: &Notification) -> anyhow::Result<()> {
        Ok(())
    }

    async fn store_changed(&self, store: &StoreId, _content: &Value) -> anyhow::Result<()> {
        self.stores.lock().unwrap().push(store.to_string());
        Ok(())
    }

    async fn shows_reloaded(&self, _replaced: &[String]) -> anyhow::Result<()> {
        *self.show_reloads.lock().unwrap() += 1;
        Ok(())
    }
}

/// One team on a folder provider
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

    pub fn remote_snapshot(&self) -> PathBuf {
        self.dir
            .path()
            .join("remote")
            .join("c1")
            .join("t1")
            .join("data.zip")
    }

    /// A device with an empty local store
    pub fn device(&self, name: &str) -> TestDevice {
        self.device_with_scratch(name, self.dir.path().join(format!("scratch-{name}")))
    }

    /// A device extracting snapshots into `scratch`
    pub fn device_with_scratch(&self, name: &str, scratch: PathBuf) -> TestDevice {
        let data = self.dir.path().join(format!("data-{name}"));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = Arc::new(SyncEngine::new(
            Arc::new(FolderProvider::new(self.dir.path().join("remote"))),
            notifier.clone(),
            stagesync_sync::store::LocalDataStore::new(data.clone()),
            DeviceId::new(format!("device-{name}")).unwrap(),
            EngineSettings::new(scratch),
        ));
        TestDevice {
            engine,
            data,
            notifier,
            church: self.church.clone(),
            team: self.team.clone(),
        }
    }
}

/// A simulated installation
pub struct TestDevice {
    pub engine: Arc<SyncEngine>,
    pub data: PathBuf,
    pub notifier: Arc<RecordingNotifier>,
    church: ChurchRef,
    team: TeamRef,
}

impl TestDevice {
    pub fn write_store(&self, store: &str, content: Value) {
        std::fs::create_dir_all(&self.data).unwrap();
        std::fs::write(
            self.data.join(format!("{store}.json")),
            serde_json::to_vec(&content).unwrap(),
        )
        .unwrap();
    }

    pub fn read_store(&self, store: &str) -> Option<Value> {
        let bytes = std::fs::read(self.data.join(format!("{store}.json"))).ok()?;
        Some(serde_json::from_slice(&bytes).unwrap())
    }

    pub fn write_show(&self, file: &str, id: &str, show: Value) {
        let dir = self.data.join("shows");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(file),
            serde_json::to_vec(&serde_json::json!([id, show])).unwrap(),
        )
        .unwrap();
    }

    pub fn show_files(&self) -> Vec<String> {
        list(self.data.join("shows"))
    }

    pub fn write_scripture(&self, name: &str, content: &[u8]) {
        let dir = self.data.join("scriptures");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    pub fn scriptures(&self) -> Vec<String> {
        list(self.data.join("scriptures"))
    }

    pub fn rotation_archives(&self) -> Vec<String> {
        list(self.data.join("cloud"))
    }

    pub fn request(&self, method: SyncMethod) -> SyncRequest {
        SyncRequest::new(self.church.clone(), self.team.clone()).with_method(method)
    }

    pub async fn sync(&self, method: SyncMethod) -> SyncReport {
        let report = self.engine.sync(&self.request(method)).await.unwrap();
        self.engine.background().wait_idle().await;
        report
    }

    pub async fn remote_ledger(&self) -> Option<ChangeLedger> {
        self.engine
            .fetch_remote_ledger(&self.church, &self.team)
            .await
            .unwrap()
    }
}

fn list(dir: PathBuf) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

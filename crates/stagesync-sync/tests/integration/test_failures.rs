//! Failures that must stay contained: broken entities, bad configuration,
//! overlapping passes and slow providers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stagesync_core::domain::{ChurchRef, DeviceId, SyncMethod, TeamRef};
use stagesync_core::ports::{ISyncProvider, ProviderId, Team};
use stagesync_provider::FolderProvider;
use stagesync_sync::archive::{self, ArchiveEntry};
use stagesync_sync::store::LocalDataStore;
use stagesync_sync::{EngineSettings, SyncEngine, SyncError};

use crate::common::{RecordingNotifier, TeamFixture};

/// Folder provider whose snapshot downloads take a while
struct SlowProvider {
    inner: FolderProvider,
    delay: Duration,
}

#[async_trait::async_trait]
impl ISyncProvider for SlowProvider {
    fn id(&self) -> ProviderId {
        self.inner.id()
    }

    async fn has_valid_connection(&self) -> anyhow::Result<bool> {
        self.inner.has_valid_connection().await
    }

    async fn list_teams(&self) -> anyhow::Result<Vec<Team>> {
        self.inner.list_teams().await
    }

    async fn existing_data(&self, church: &ChurchRef, team: &TeamRef) -> anyhow::Result<bool> {
        self.inner.existing_data(church, team).await
    }

    async fn has_changed(&self, church: &ChurchRef, team: &TeamRef) -> anyhow::Result<bool> {
        self.inner.has_changed(church, team).await
    }

    async fn fetch_snapshot(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
        dest_dir: &Path,
    ) -> anyhow::Result<Option<PathBuf>> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_snapshot(church, team, dest_dir).await
    }

    async fn upload_snapshot(&self, team: &TeamRef, archive: &Path) -> anyhow::Result<bool> {
        self.inner.upload_snapshot(team, archive).await
    }

    async fn fetch_backup(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
        dest_dir: &Path,
    ) -> anyhow::Result<Option<PathBuf>> {
        self.inner.fetch_backup(church, team, dest_dir).await
    }

    async fn upload_backup(&self, team: &TeamRef, archive: &Path) -> anyhow::Result<bool> {
        self.inner.upload_backup(team, archive).await
    }
}

#[tokio::test]
async fn test_unwritable_show_does_not_stop_the_others() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_show("Easter.show", "s1", json!({"name": "Easter", "timestamps": {"modified": 50}}));
    a.write_show("Advent.show", "s2", json!({"name": "Advent", "timestamps": {"modified": 50}}));
    a.write_store("OVERLAYS", json!({"o1": {"modified": 100}}));
    assert!(a.sync(SyncMethod::Merge).await.success);

    let b = team.device("b");
    std::fs::create_dir_all(b.data.join("shows").join("Easter.show").join("taken")).unwrap();

    let report = b.sync(SyncMethod::Merge).await;

    assert!(report.success);
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert!(report.errors[0].contains("Easter"), "{:?}", report.errors);
    assert!(b.data.join("shows").join("Advent.show").is_file());
    assert!(b.read_store("OVERLAYS").unwrap().get("o1").is_some());
}

#[tokio::test]
async fn test_invalid_store_entry_is_skipped() {
    let team = TeamFixture::new();
    archive::compress(
        vec![
            ArchiveEntry::bytes("STAGE.json", b"{\"main\": ".to_vec()),
            ArchiveEntry::bytes("OVERLAYS.json", br#"{"o1": {"modified": 5}}"#.to_vec()),
        ],
        &team.remote_snapshot(),
    )
    .await
    .unwrap();

    let b = team.device("b");
    let report = b.sync(SyncMethod::Merge).await;

    assert!(report.success);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert!(b.read_store("STAGE").is_none());
    assert!(b.read_store("OVERLAYS").unwrap().get("o1").is_some());
}

#[tokio::test]
async fn test_second_pass_is_rejected_while_one_runs() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));
    let request = a.request(SyncMethod::Merge);

    let (first, second) = tokio::join!(a.engine.sync(&request), a.engine.sync(&request));
    a.engine.background().wait_idle().await;

    let results = [first, second];
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SyncError::AlreadyRunning)))
        .count();
    assert_eq!(rejected, 1);
    assert!(results.iter().any(|r| matches!(r, Ok(report) if report.success)));
    assert!(!a.engine.is_busy());
}

#[tokio::test]
async fn test_scratch_inside_data_dir_is_refused() {
    let team = TeamFixture::new();
    let scratch = team.dir.path().join("data-a").join("cloud-scratch");
    let a = team.device_with_scratch("a", scratch);
    a.write_store("STAGE", json!({"main": {"modified": 100}}));

    let result = a.engine.sync(&a.request(SyncMethod::Merge)).await;

    assert!(matches!(result, Err(SyncError::ScratchOverlapsData(_))));
    assert!(a.read_store("STAGE").is_some());
    assert!(!team.remote_snapshot().exists());
}

#[tokio::test]
async fn test_data_dir_inside_scratch_is_refused() {
    let team = TeamFixture::new();
    let a = team.device_with_scratch("a", team.dir.path().to_path_buf());
    a.write_store("STAGE", json!({"main": {"modified": 100}}));

    let result = a.engine.sync(&a.request(SyncMethod::Merge)).await;

    assert!(matches!(result, Err(SyncError::ScratchOverlapsData(_))));
    assert!(a.read_store("STAGE").is_some());
}

#[tokio::test]
async fn test_timed_out_pass_finishes_in_background() {
    let team = TeamFixture::new();
    let data = team.dir.path().join("data-slow");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("STAGE.json"), br#"{"main": {"modified": 100}}"#).unwrap();

    let mut settings = EngineSettings::new(team.dir.path().join("scratch-slow"));
    settings.timeout = Duration::from_millis(50);
    let engine = Arc::new(SyncEngine::new(
        Arc::new(SlowProvider {
            inner: FolderProvider::new(team.dir.path().join("remote")),
            delay: Duration::from_millis(300),
        }),
        Arc::new(RecordingNotifier::default()),
        LocalDataStore::new(data),
        DeviceId::new("device-slow".to_string()).unwrap(),
        settings,
    ));
    let request = stagesync_sync::SyncRequest::new(team.church.clone(), team.team.clone());

    let report = engine.sync_data(&request).await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("timed out"));
    assert!(engine.is_busy());

    engine.background().wait_idle().await;

    assert!(!engine.is_busy());
    assert!(team.remote_snapshot().exists());
}

//! Sync methods other than a plain merge, change detection and backups

use serde_json::{json, Value};
use stagesync_core::domain::{DeviceId, SyncMethod};
use stagesync_sync::archive;

use crate::common::TeamFixture;

async fn remote_store(team: &TeamFixture, store: &str) -> Option<Value> {
    let bytes = archive::read_entry(&team.remote_snapshot(), &format!("{store}.json"))
        .await
        .unwrap()?;
    Some(serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_replace_adopts_cloud_data_without_uploading() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));
    a.write_show("Easter.show", "s1", json!({"name": "Easter", "timestamps": {"modified": 50}}));
    a.sync(SyncMethod::Merge).await;

    let b = team.device("b");
    b.write_store("STAGE", json!({"mine": {"modified": 900}}));
    b.write_show("Local.show", "s9", json!({"name": "Local", "timestamps": {"modified": 900}}));

    let report = b.sync(SyncMethod::Replace).await;

    assert!(report.success);
    let stage = b.read_store("STAGE").unwrap();
    assert!(stage.get("main").is_some());
    assert!(stage.get("mine").is_none());
    assert_eq!(b.show_files(), vec!["Easter.show".to_string()]);
    assert!(b.rotation_archives().is_empty());

    let ledger = b.remote_ledger().await.unwrap();
    assert!(!ledger.contains_device(&DeviceId::new("device-b".to_string()).unwrap()));
}

#[tokio::test]
async fn test_read_only_keeps_cloud_untouched() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;

    let b = team.device("b");
    b.write_store("STAGE", json!({"mine": {"modified": 500}}));
    let report = b.sync(SyncMethod::ReadOnly).await;

    assert!(report.success);
    let stage = b.read_store("STAGE").unwrap();
    assert!(stage.get("main").is_some());
    assert!(stage.get("mine").is_some());

    let remote = remote_store(&team, "STAGE").await.unwrap();
    assert!(remote.get("mine").is_none());

    let carried = b.engine.carried_ledger().unwrap();
    assert!(carried.contains_device(b.engine.device()));
}

#[tokio::test]
async fn test_read_only_without_snapshot_uploads_nothing() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));

    let report = a.sync(SyncMethod::ReadOnly).await;

    assert!(report.success);
    assert!(!team.remote_snapshot().exists());
}

#[tokio::test]
async fn test_upload_publishes_local_state_as_is() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;

    let b = team.device("b");
    b.write_store("STAGE", json!({"mine": {"modified": 1}}));
    let report = b.sync(SyncMethod::Upload).await;

    assert!(report.success);
    assert_eq!(report.downloaded, 0);
    let remote = remote_store(&team, "STAGE").await.unwrap();
    assert_eq!(remote, json!({"mine": {"modified": 1}}));
    assert!(b.read_store("STAGE").unwrap().get("main").is_none());
}

#[tokio::test]
async fn test_merge_reports_changed_stores() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("OVERLAYS", json!({"o1": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;

    let b = team.device("b");
    let request = stagesync_sync::SyncRequest::new(team.church.clone(), team.team.clone());
    let report = b.engine.sync_data(&request).await;
    b.engine.background().wait_idle().await;

    assert!(report.success);
    assert!(report.error.is_none());
    assert_eq!(report.changed_files, vec!["OVERLAYS_o1".to_string()]);
    assert_eq!(*b.notifier.stores.lock().unwrap(), vec!["OVERLAYS".to_string()]);
}

#[tokio::test]
async fn test_change_detection_follows_other_devices() {
    let team = TeamFixture::new();
    let a = team.device("a");
    let b = team.device("b");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;

    assert!(b.engine.has_data_changed(&team.church, &team.team).await.unwrap());
    b.sync(SyncMethod::Merge).await;
    assert!(!b.engine.has_data_changed(&team.church, &team.team).await.unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    a.sync(SyncMethod::Merge).await;
    assert!(b.engine.has_data_changed(&team.church, &team.team).await.unwrap());
}

#[tokio::test]
async fn test_first_upload_seeds_official_backup() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));

    a.sync(SyncMethod::Merge).await;

    let backup = team.remote_snapshot().with_file_name("backup.zip");
    assert!(backup.exists());
    assert!(archive::read_entry(&backup, "STAGE.json").await.unwrap().is_some());
}

#[tokio::test]
async fn test_closing_pass_skips_backup() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));

    let request =
        stagesync_sync::SyncRequest::new(team.church.clone(), team.team.clone()).closing(true);
    let report = a.engine.sync(&request).await.unwrap();
    a.engine.background().wait_idle().await;

    assert!(report.success);
    assert!(team.remote_snapshot().exists());
    assert!(!team.remote_snapshot().with_file_name("backup.zip").exists());
}

//! Creates and deletes travelling between devices through the change ledger

use serde_json::json;
use stagesync_core::domain::{DeviceId, MarkerKind, SyncMethod};
use stagesync_sync::archive::{self, ArchiveEntry};

use crate::common::TeamFixture;

#[tokio::test]
async fn test_first_device_uploads_when_team_is_empty() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"name": "Main", "modified": 100}}));

    let report = a.sync(SyncMethod::Merge).await;

    assert!(report.success);
    assert!(team.remote_snapshot().exists());
    assert_eq!(a.rotation_archives().len(), 1);

    let ledger = a.remote_ledger().await.unwrap();
    assert_eq!(ledger.devices(), &[DeviceId::new("device-a".to_string()).unwrap()]);
}

#[tokio::test]
async fn test_new_device_receives_everything() {
    let team = TeamFixture::new();
    let a = team.device("a");
    a.write_store("STAGE", json!({"main": {"name": "Main", "modified": 100}}));
    a.write_store("SETTINGS", json!({"theme": "dark"}));
    a.write_show("Easter.show", "s1", json!({"name": "Easter", "timestamps": {"modified": 50}}));
    a.write_scripture("KJV", b"in the beginning");
    assert!(a.sync(SyncMethod::Merge).await.success);

    let b = team.device("b");
    let report = b.sync(SyncMethod::Merge).await;

    assert!(report.success);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(b.read_store("STAGE").unwrap()["main"]["name"], "Main");
    assert_eq!(b.read_store("SETTINGS").unwrap(), json!({"theme": "dark"}));
    assert_eq!(b.show_files(), vec!["Easter.show".to_string()]);
    assert_eq!(b.scriptures(), vec!["KJV".to_string()]);
    assert!(b.notifier.stores.lock().unwrap().contains(&"STAGE".to_string()));
    assert_eq!(*b.notifier.show_reloads.lock().unwrap(), 1);

    let ledger = b.remote_ledger().await.unwrap();
    assert_eq!(ledger.devices().len(), 2);
}

#[tokio::test]
async fn test_entity_created_on_one_device_reaches_the_other() {
    let team = TeamFixture::new();
    let a = team.device("a");
    let b = team.device("b");
    a.write_store("STAGE", json!({"main": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;

    let mut stage = a.read_store("STAGE").unwrap();
    stage["side"] = json!({"modified": 200});
    a.write_store("STAGE", stage);
    a.sync(SyncMethod::Merge).await;

    let ledger = a.remote_ledger().await.unwrap();
    assert!(ledger.has_marker(MarkerKind::Created, "STAGE_side"));

    b.sync(SyncMethod::Merge).await;

    assert!(b.read_store("STAGE").unwrap().get("side").is_some());
    let ledger = b.remote_ledger().await.unwrap();
    assert!(!ledger.has_marker(MarkerKind::Created, "STAGE_side"));
}

#[tokio::test]
async fn test_entity_deleted_on_one_device_is_deleted_on_the_other() {
    let team = TeamFixture::new();
    let a = team.device("a");
    let b = team.device("b");
    a.write_store("STAGE", json!({"keep": {"modified": 100}, "drop": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;
    a.sync(SyncMethod::Merge).await;

    a.write_store("STAGE", json!({"keep": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;

    let ledger = a.remote_ledger().await.unwrap();
    assert!(ledger.has_marker(MarkerKind::Deleted, "STAGE_drop"));

    let report = b.sync(SyncMethod::Merge).await;

    assert_eq!(report.deleted, 1);
    let stage = b.read_store("STAGE").unwrap();
    assert!(stage.get("drop").is_none());
    assert!(stage.get("keep").is_some());

    let ledger = b.remote_ledger().await.unwrap();
    assert!(!ledger.has_marker(MarkerKind::Deleted, "STAGE_drop"));
}

#[tokio::test]
async fn test_restored_entity_is_announced_again() {
    let team = TeamFixture::new();
    let a = team.device("a");
    let b = team.device("b");
    a.write_store("STAGE", json!({"keep": {"modified": 100}, "back": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;

    a.write_store("STAGE", json!({"keep": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;
    a.write_store("STAGE", json!({"keep": {"modified": 100}, "back": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;

    let ledger = a.remote_ledger().await.unwrap();
    assert!(!ledger.has_marker(MarkerKind::Deleted, "STAGE_back"));
    assert!(ledger.has_marker(MarkerKind::Created, "STAGE_back"));

    b.sync(SyncMethod::Merge).await;
    assert!(b.read_store("STAGE").unwrap().get("back").is_some());
}

#[tokio::test]
async fn test_newer_cloud_entity_overwrites_local() {
    let team = TeamFixture::new();
    let a = team.device("a");
    let b = team.device("b");
    a.write_store("OVERLAYS", json!({"o1": {"name": "old", "modified": 100}}));
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;

    a.write_store("OVERLAYS", json!({"o1": {"name": "new", "modified": 300}}));
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;

    assert_eq!(b.read_store("OVERLAYS").unwrap()["o1"]["name"], "new");
}

#[tokio::test]
async fn test_show_deleted_on_one_device_is_deleted_on_the_other() {
    let team = TeamFixture::new();
    let a = team.device("a");
    let b = team.device("b");
    a.write_show("Easter.show", "s1", json!({"name": "Easter", "timestamps": {"modified": 50}}));
    a.write_show("Advent.show", "s2", json!({"name": "Advent", "timestamps": {"modified": 50}}));
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;
    a.sync(SyncMethod::Merge).await;

    std::fs::remove_file(a.data.join("shows").join("Advent.show")).unwrap();
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;

    assert_eq!(b.show_files(), vec!["Easter.show".to_string()]);
}

#[tokio::test]
async fn test_project_groups_merge_per_entity() {
    let team = TeamFixture::new();
    let a = team.device("a");
    let b = team.device("b");
    a.write_store(
        "PROJECTS",
        json!({"projects": {"p1": {"name": "Sunday", "modified": 10}}, "folders": {}}),
    );
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;

    let projects = b.read_store("PROJECTS").unwrap();
    assert_eq!(projects["projects"]["p1"]["name"], "Sunday");
}

#[tokio::test]
async fn test_malformed_ledger_treats_device_as_new() {
    let team = TeamFixture::new();
    archive::compress(
        vec![
            ArchiveEntry::bytes("STAGE.json", br#"{"main": {"modified": 5}}"#.to_vec()),
            ArchiveEntry::bytes("changes.json", b"not a ledger".to_vec()),
        ],
        &team.remote_snapshot(),
    )
    .await
    .unwrap();

    let b = team.device("b");
    let report = b.sync(SyncMethod::Merge).await;

    assert!(report.success);
    assert!(b.read_store("STAGE").unwrap().get("main").is_some());
    let ledger = b.remote_ledger().await.unwrap();
    assert_eq!(ledger.devices().len(), 1);
}

#[tokio::test]
async fn test_upload_from_fresh_engine_keeps_team_ledger() {
    let team = TeamFixture::new();
    let a = team.device("a");
    let b = team.device("b");
    a.write_store("STAGE", json!({"keep": {"modified": 100}, "drop": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;
    b.sync(SyncMethod::Merge).await;
    a.sync(SyncMethod::Merge).await;
    a.write_store("STAGE", json!({"keep": {"modified": 100}}));
    a.sync(SyncMethod::Merge).await;

    // A new process for device a has nothing carried in memory.
    let restarted = team.device("a");
    assert!(restarted.engine.carried_ledger().is_none());
    let report = restarted.sync(SyncMethod::Upload).await;
    assert!(report.success);

    let ledger = restarted.remote_ledger().await.unwrap();
    assert_eq!(ledger.devices().len(), 2);
    assert!(ledger.has_marker(MarkerKind::Deleted, "STAGE_drop"));

    let report = b.sync(SyncMethod::Merge).await;

    assert_eq!(report.deleted, 1);
    let stage = b.read_store("STAGE").unwrap();
    assert!(stage.get("drop").is_none());
    assert!(stage.get("keep").is_some());
    let ledger = b.remote_ledger().await.unwrap();
    assert!(!ledger.has_marker(MarkerKind::Created, "STAGE_drop"));
}

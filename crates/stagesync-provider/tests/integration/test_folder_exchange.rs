//! Snapshot and backup exchange between two provider instances

use crate::common::TeamFixture;

#[tokio::test]
async fn test_snapshot_published_by_one_device_reaches_another() {
    let fixture = TeamFixture::new();
    let device_a = fixture.provider();
    let device_b = fixture.provider();
    let archive = fixture.archive("upload.zip", b"snapshot v1");

    assert!(device_a.upload_snapshot(&fixture.team, &archive).await.unwrap());
    assert!(device_b
        .existing_data(&fixture.church, &fixture.team)
        .await
        .unwrap());

    let fetched = device_b
        .fetch_snapshot(&fixture.church, &fixture.team, &fixture.scratch("b"))
        .await
        .unwrap()
        .expect("snapshot should exist");
    assert_eq!(std::fs::read(fetched).unwrap(), b"snapshot v1");
}

#[tokio::test]
async fn test_has_changed_tracks_last_fetch() {
    let fixture = TeamFixture::new();
    let device_a = fixture.provider();
    let device_b = fixture.provider();

    assert!(!device_b
        .has_changed(&fixture.church, &fixture.team)
        .await
        .unwrap());

    let archive = fixture.archive("upload.zip", b"snapshot v1");
    device_a.upload_snapshot(&fixture.team, &archive).await.unwrap();

    assert!(device_b
        .has_changed(&fixture.church, &fixture.team)
        .await
        .unwrap());
    assert!(!device_a
        .has_changed(&fixture.church, &fixture.team)
        .await
        .unwrap());

    device_b
        .fetch_snapshot(&fixture.church, &fixture.team, &fixture.scratch("b"))
        .await
        .unwrap();
    assert!(!device_b
        .has_changed(&fixture.church, &fixture.team)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_backup_round_trip() {
    let fixture = TeamFixture::new();
    let provider = fixture.provider();

    assert!(provider
        .fetch_backup(&fixture.church, &fixture.team, &fixture.scratch("a"))
        .await
        .unwrap()
        .is_none());

    let archive = fixture.archive("backup-src.zip", b"backup");
    assert!(provider.upload_backup(&fixture.team, &archive).await.unwrap());

    let fetched = provider
        .fetch_backup(&fixture.church, &fixture.team, &fixture.scratch("a"))
        .await
        .unwrap()
        .expect("backup should exist");
    assert_eq!(std::fs::read(fetched).unwrap(), b"backup");
}

#[tokio::test]
async fn test_list_teams_defaults_name_to_id() {
    let fixture = TeamFixture::new();
    let teams = fixture.provider().list_teams().await.unwrap();

    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].id, fixture.team);
    assert_eq!(teams[0].name, "t1");
}

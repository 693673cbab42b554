//! Flattening the local store into snapshot entries
//!
//! Copies everything that is synced into a staging directory laid out the
//! way a snapshot is: `<STORE>.json` per document store, one
//! `SHOWS_CONTENT.json` mapping show id to show, and one `BIBLE_<name>` file
//! per scripture. Copies keep their modification times so archive entries
//! carry the local edit time.

use std::path::Path;

use serde_json::{Map, Value};
use stagesync_core::domain::entity::{
    synced_document_stores, BIBLE_PREFIX, SHOWS_CONTENT_ENTRY, SHOW_EXTENSION,
};
use stagesync_core::domain::StoreId;
use tracing::{debug, instrument, warn};

use crate::archive::ArchiveEntry;
use crate::store::{copy_preserving_mtime, write_atomic, LocalDataStore};
use crate::SyncError;

/// Stages the local store in `dest` and lists the resulting entries
///
/// `dest` is emptied first.
///
/// # Returns
/// The entries to compress, or an empty list when the local store holds
/// nothing to sync
///
/// # Errors
/// Returns error if the staging directory cannot be written
#[instrument(skip(store), fields(root = %store.root().display()))]
pub async fn export_snapshot(
    store: &LocalDataStore,
    dest: &Path,
) -> Result<Vec<ArchiveEntry>, SyncError> {
    crate::store::remove_dir_all(dest).await?;
    tokio::fs::create_dir_all(dest).await?;

    let mut entries = Vec::new();

    for (name, _) in synced_document_stores() {
        let store_id = StoreId::new(name.to_string())?;
        let source = store.document_path(&store_id);
        if !store.file_state(&source).await?.exists {
            continue;
        }
        let entry_name = format!("{name}.json");
        let staged = dest.join(&entry_name);
        copy_preserving_mtime(&source, &staged).await?;
        entries.push(ArchiveEntry::file(entry_name, staged));
    }

    let shows_dir = store.shows_dir();
    let mut shows = Map::new();
    for file_name in store.list_files(&shows_dir, Some(SHOW_EXTENSION)).await? {
        match store.read_show_entry(&shows_dir.join(&file_name)).await? {
            Some((id, show)) => {
                shows.insert(id, show);
            }
            None => warn!(file = %file_name, "Leaving unreadable show out of the snapshot"),
        }
    }

    let scriptures_dir = store.scriptures_dir();
    let mut scriptures = Vec::new();
    for name in store.list_files(&scriptures_dir, None).await? {
        let entry_name = format!("{BIBLE_PREFIX}{name}");
        let staged = dest.join(&entry_name);
        copy_preserving_mtime(&scriptures_dir.join(&name), &staged).await?;
        scriptures.push(ArchiveEntry::file(entry_name, staged));
    }

    if entries.is_empty() && shows.is_empty() && scriptures.is_empty() {
        debug!("local store is empty");
        return Ok(Vec::new());
    }

    // Always present so show deletions reach other devices.
    let staged = dest.join(SHOWS_CONTENT_ENTRY);
    write_atomic(&staged, &serde_json::to_vec(&Value::Object(shows))?).await?;
    entries.push(ArchiveEntry::file(SHOWS_CONTENT_ENTRY, staged));
    entries.extend(scriptures);

    debug!(entries = entries.len(), "local store staged");
    Ok(entries)
}

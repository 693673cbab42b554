//! Local data store adapter
//!
//! The application keeps its data in a single directory:
//!
//! ```text
//! <root>/
//!   <STORE>.json        one JSON document per store
//!   shows/<name>.show   one file per show, holding `[id, show]`
//!   scriptures/<name>   one binary file per scripture
//!   cloud/<time>.zip    local rotation archives
//! ```
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: Uses write-to-temp + rename so the application never
//!   reads a half-written store.
//! - **Timestamps survive moves**: Files moved across filesystems keep their
//!   modification time, since reconciliation compares it.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde_json::Value;
use stagesync_core::domain::StoreId;
use tracing::{debug, instrument, warn};

use crate::SyncError;

const SHOWS_DIR: &str = "shows";
const SCRIPTURES_DIR: &str = "scriptures";
const ROTATION_DIR: &str = "cloud";

// ============================================================================
// FileState
// ============================================================================

/// Existence and modification time of a local file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileState {
    /// Whether the path exists
    pub exists: bool,
    /// Last modification time, if the filesystem reports one
    pub modified: Option<DateTime<Utc>>,
}

impl FileState {
    /// State of a path that does not exist
    pub fn not_found() -> Self {
        Self::default()
    }
}

// ============================================================================
// LocalDataStore
// ============================================================================

/// Adapter over the application's data directory
#[derive(Debug, Clone)]
pub struct LocalDataStore {
    root: PathBuf,
}

impl LocalDataStore {
    /// Creates a store rooted at `root`. Nothing is touched on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one file per show
    pub fn shows_dir(&self) -> PathBuf {
        self.root.join(SHOWS_DIR)
    }

    /// Directory holding one file per scripture
    pub fn scriptures_dir(&self) -> PathBuf {
        self.root.join(SCRIPTURES_DIR)
    }

    /// Directory holding the local rotation archives
    pub fn rotation_dir(&self) -> PathBuf {
        self.root.join(ROTATION_DIR)
    }

    /// Path of a store's JSON document
    pub fn document_path(&self, store: &StoreId) -> PathBuf {
        self.root.join(format!("{}.json", store.as_str()))
    }

    // --- Documents ---

    /// Reads a store document
    ///
    /// # Returns
    /// `None` if the store has never been written
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid JSON
    #[instrument(skip(self), fields(store = %store))]
    pub async fn read_document(&self, store: &StoreId) -> Result<Option<Value>, SyncError> {
        let path = self.document_path(store);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("store document not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Replaces a store document atomically
    #[instrument(skip(self, content), fields(store = %store))]
    pub async fn write_document(&self, store: &StoreId, content: &Value) -> Result<(), SyncError> {
        let bytes = serde_json::to_vec(content)?;
        write_atomic(&self.document_path(store), &bytes).await
    }

    // --- Shows ---

    /// Reads a show file
    ///
    /// # Returns
    /// The show object, or `None` if the file is missing or not a valid
    /// `[id, show]` pair
    pub async fn read_show(&self, path: &Path) -> Result<Option<Value>, SyncError> {
        Ok(self.read_show_entry(path).await?.map(|(_, show)| show))
    }

    /// Reads a show file together with the show's id
    #[instrument(skip(self))]
    pub async fn read_show_entry(&self, path: &Path) -> Result<Option<(String, Value)>, SyncError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(mut pair)) if pair.len() == 2 && pair[0].is_string() => {
                let show = pair.swap_remove(1);
                let id = pair[0].as_str().unwrap_or_default().to_string();
                Ok(Some((id, show)))
            }
            Ok(_) => {
                warn!(path = %path.display(), "Show file is not an [id, show] pair");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Show file is not valid JSON");
                Ok(None)
            }
        }
    }

    /// Writes a show file as `[id, show]`
    #[instrument(skip(self, show))]
    pub async fn write_show(&self, path: &Path, id: &str, show: &Value) -> Result<(), SyncError> {
        let bytes = serde_json::to_vec(&serde_json::json!([id, show]))?;
        write_atomic(path, &bytes).await
    }

    // --- Directories and files ---

    /// Lists file names in a directory
    ///
    /// # Arguments
    /// * `dir` - Directory to list; a missing directory is empty
    /// * `extension` - Only keep names with this extension
    pub async fn list_files(
        &self,
        dir: &Path,
        extension: Option<&str>,
    ) -> Result<Vec<String>, SyncError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let matches = match extension {
                Some(ext) => Path::new(&name).extension().and_then(|e| e.to_str()) == Some(ext),
                None => true,
            };
            if matches {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Stats a file
    pub async fn file_state(&self, path: &Path) -> Result<FileState, SyncError> {
        file_state(path).await
    }

    /// Removes a file; a missing file is not an error
    #[instrument(skip(self))]
    pub async fn remove_file(&self, path: &Path) -> Result<(), SyncError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a directory with everything in it and recreates it empty
    #[instrument(skip(self))]
    pub async fn wipe_dir(&self, dir: &Path) -> Result<(), SyncError> {
        remove_dir_all(dir).await?;
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    /// Moves a file into place, replacing any existing file
    ///
    /// Falls back to copy + delete when source and target are on different
    /// filesystems. The modification time is kept either way.
    #[instrument(skip(self))]
    pub async fn move_file(&self, from: &Path, to: &Path) -> Result<(), SyncError> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match tokio::fs::rename(from, to).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SyncError::PathNotFound(from.to_path_buf()))
            }
            Err(e) => debug!(error = %e, "rename failed, copying instead"),
        }

        copy_preserving_mtime(from, to).await?;
        tokio::fs::remove_file(from).await?;
        Ok(())
    }
}

// ============================================================================
// Shared filesystem helpers
// ============================================================================

/// Converts a filesystem timestamp to UTC
pub(crate) fn system_time_to_utc(time: SystemTime) -> Option<DateTime<Utc>> {
    time.duration_since(std::time::UNIX_EPOCH)
        .ok()
        .and_then(|dur| DateTime::from_timestamp(dur.as_secs() as i64, dur.subsec_nanos()))
}

pub(crate) async fn file_state(path: &Path) -> Result<FileState, SyncError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FileState::not_found()),
        Err(e) => return Err(e.into()),
    };
    Ok(FileState {
        exists: true,
        modified: metadata.modified().ok().and_then(system_time_to_utc),
    })
}

/// Write to a uniquely named temporary sibling and rename over the target
///
/// Each call gets its own temporary file, so concurrent writers to the same
/// target never share one; the last rename wins.
pub(crate) async fn write_atomic(target: &Path, data: &[u8]) -> Result<(), SyncError> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let target = target.to_path_buf();
    let data = data.to_vec();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        debug!(tmp_path = ?tmp.path(), bytes = data.len(), "writing to temporary file");
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await??;
    Ok(())
}

/// Sets a file's modification time
pub(crate) async fn set_modified(path: &Path, time: SystemTime) -> Result<(), SyncError> {
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

/// Copies a file and carries its modification time over
pub(crate) async fn copy_preserving_mtime(from: &Path, to: &Path) -> Result<(), SyncError> {
    let modified = tokio::fs::metadata(from).await?.modified().ok();
    tokio::fs::copy(from, to).await?;
    if let Some(modified) = modified {
        set_modified(to, modified).await?;
    }
    Ok(())
}

/// Removes a directory tree; a missing directory is not an error
pub(crate) async fn remove_dir_all(dir: &Path) -> Result<(), SyncError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn store_id(s: &str) -> StoreId {
        StoreId::new(s.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_document_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());

        assert!(store.read_document(&store_id("STAGE")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());
        let content = json!({"a": {"name": "Main", "modified": 5}});

        store.write_document(&store_id("STAGE"), &content).await.unwrap();

        assert_eq!(
            store.read_document(&store_id("STAGE")).await.unwrap(),
            Some(content)
        );
        assert!(!dir.path().join("STAGE.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_one_target_leave_one_whole_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shows").join("Easter.show");
        let first = vec![b'a'; 64 * 1024];
        let second = vec![b'b'; 64 * 1024];

        let (r1, r2) = tokio::join!(
            write_atomic(&target, &first),
            write_atomic(&target, &second)
        );
        r1.unwrap();
        r2.unwrap();

        let written = std::fs::read(&target).unwrap();
        assert!(written == first || written == second);
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != target)
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_document_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("STAGE.json"), b"{not json").unwrap();
        let store = LocalDataStore::new(dir.path());

        let result = store.read_document(&store_id("STAGE")).await;
        assert!(matches!(result, Err(SyncError::JsonError(_))));
    }

    #[tokio::test]
    async fn test_show_file_holds_id_and_show() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());
        let path = store.shows_dir().join("Easter.show");
        let show = json!({"name": "Easter", "timestamps": {"modified": 10}});

        store.write_show(&path, "s1", &show).await.unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw, json!(["s1", show]));
        assert_eq!(store.read_show(&path).await.unwrap(), Some(show.clone()));
        assert_eq!(
            store.read_show_entry(&path).await.unwrap(),
            Some(("s1".to_string(), show))
        );
    }

    #[tokio::test]
    async fn test_invalid_show_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());
        std::fs::create_dir_all(store.shows_dir()).unwrap();
        let path = store.shows_dir().join("Broken.show");
        std::fs::write(&path, b"{\"name\": 1}").unwrap();

        assert!(store.read_show(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_files_filters_extension() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());
        let shows = store.shows_dir();
        std::fs::create_dir_all(shows.join("nested")).unwrap();
        std::fs::write(shows.join("b.show"), b"[]").unwrap();
        std::fs::write(shows.join("a.show"), b"[]").unwrap();
        std::fs::write(shows.join("a.show.tmp"), b"[]").unwrap();

        let names = store.list_files(&shows, Some("show")).await.unwrap();
        assert_eq!(names, vec!["a.show".to_string(), "b.show".to_string()]);
    }

    #[tokio::test]
    async fn test_list_files_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());

        assert!(store
            .list_files(&store.scriptures_dir(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_file_state() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());
        let path = dir.path().join("x");

        assert_eq!(store.file_state(&path).await.unwrap(), FileState::not_found());

        std::fs::write(&path, b"x").unwrap();
        let state = store.file_state(&path).await.unwrap();
        assert!(state.exists);
        assert!(state.modified.is_some());
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());

        store.remove_file(&dir.path().join("gone")).await.unwrap();
    }

    #[tokio::test]
    async fn test_wipe_dir_leaves_empty_dir() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());
        let shows = store.shows_dir();
        std::fs::create_dir_all(&shows).unwrap();
        std::fs::write(shows.join("a.show"), b"[]").unwrap();

        store.wipe_dir(&shows).await.unwrap();

        assert!(shows.is_dir());
        assert_eq!(std::fs::read_dir(&shows).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_move_file_keeps_mtime() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());
        let from = dir.path().join("incoming");
        let to = store.scriptures_dir().join("KJV");
        std::fs::write(&from, b"bible").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        set_modified(&from, old).await.unwrap();

        store.move_file(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"bible");
        let moved = std::fs::metadata(&to).unwrap().modified().unwrap();
        assert_eq!(system_time_to_utc(moved), system_time_to_utc(old));
    }

    #[tokio::test]
    async fn test_move_missing_file_is_path_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(dir.path());

        let result = store
            .move_file(&dir.path().join("nope"), &dir.path().join("there"))
            .await;
        assert!(matches!(result, Err(SyncError::PathNotFound(_))));
    }

    #[tokio::test]
    async fn test_copy_preserving_mtime() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        std::fs::write(&from, b"a").unwrap();
        let old = SystemTime::now() - Duration::from_secs(86_400);
        set_modified(&from, old).await.unwrap();

        copy_preserving_mtime(&from, &to).await.unwrap();

        let copied = std::fs::metadata(&to).unwrap().modified().unwrap();
        assert_eq!(system_time_to_utc(copied), system_time_to_utc(old));
    }
}

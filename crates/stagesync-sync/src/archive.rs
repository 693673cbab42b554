//! Snapshot archive reading and writing
//!
//! A snapshot is a zip file with one entry per synced store plus the change
//! ledger. Entry modification times are part of the format: file-backed
//! entities are reconciled by comparing them with local file times.
//!
//! ## Design Decisions
//!
//! - **Blocking I/O off the runtime**: the `zip` crate is synchronous, so
//!   every operation runs inside `spawn_blocking`.
//! - **Zip times are local wall-clock times** with two second resolution.
//!   They are converted through the local timezone and always rounded down,
//!   which keeps a re-extracted file from looking newer than its source.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};
use tracing::{debug, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::store::system_time_to_utc;
use crate::SyncError;

// ============================================================================
// Types
// ============================================================================

/// A file written out of a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Entry name inside the archive
    pub name: String,
    /// Where the entry was written
    pub path: PathBuf,
    /// Entry modification time
    pub modified: Option<DateTime<Utc>>,
}

/// Content of an entry to compress
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    /// Read from disk, dated by the file's modification time
    File(PathBuf),
    /// Given in memory, dated now
    Bytes(Vec<u8>),
}

/// An entry to add to a new archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry name inside the archive
    pub name: String,
    /// Entry content
    pub source: ArchiveSource,
}

impl ArchiveEntry {
    /// Entry read from a file on disk
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: ArchiveSource::File(path.into()),
        }
    }

    /// Entry built from bytes in memory
    pub fn bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: ArchiveSource::Bytes(bytes),
        }
    }
}

// ============================================================================
// Time conversion
// ============================================================================

fn zip_time_to_utc(time: zip::DateTime) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn utc_to_zip_time(time: DateTime<Utc>) -> Option<zip::DateTime> {
    let local = time.with_timezone(&Local);
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

// ============================================================================
// Reading
// ============================================================================

/// Extracts every file entry of an archive
///
/// Entries whose names would escape `dest` are skipped. Each written file
/// gets the entry's modification time.
///
/// # Arguments
/// * `archive` - The snapshot zip
/// * `dest` - Directory to extract into; created if missing
///
/// # Errors
/// Returns error if the archive is unreadable or a file cannot be written
#[instrument]
pub async fn extract(archive: &Path, dest: &Path) -> Result<Vec<ExtractedEntry>, SyncError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest)).await?
}

fn extract_blocking(archive: &Path, dest: &Path) -> Result<Vec<ExtractedEntry>, SyncError> {
    std::fs::create_dir_all(dest)?;
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut extracted = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %name, "Skipping archive entry with unsafe path");
            continue;
        };

        let path = dest.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let modified = entry.last_modified().and_then(zip_time_to_utc);
        let mut out = File::create(&path)?;
        std::io::copy(&mut entry, &mut out)?;
        if let Some(modified) = modified {
            out.set_modified(SystemTime::from(modified))?;
        }

        extracted.push(ExtractedEntry {
            name,
            path,
            modified,
        });
    }

    debug!(entries = extracted.len(), "archive extracted");
    Ok(extracted)
}

/// Reads the modification time of every entry by name
#[instrument]
pub async fn entry_dates(archive: &Path) -> Result<HashMap<String, DateTime<Utc>>, SyncError> {
    let archive = archive.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<HashMap<String, DateTime<Utc>>, SyncError> {
        let mut zip = ZipArchive::new(File::open(&archive)?)?;
        let mut dates = HashMap::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index)?;
            if let Some(modified) = entry.last_modified().and_then(zip_time_to_utc) {
                dates.insert(entry.name().to_string(), modified);
            }
        }
        Ok(dates)
    })
    .await?
}

/// Reads one entry into memory
///
/// # Returns
/// `None` if the archive has no entry with that name
#[instrument]
pub async fn read_entry(archive: &Path, name: &str) -> Result<Option<Vec<u8>>, SyncError> {
    let archive = archive.to_path_buf();
    let name = name.to_string();
    tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, SyncError> {
        let mut zip = ZipArchive::new(File::open(&archive)?)?;
        let mut entry = match zip.by_name(&name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        std::io::copy(&mut entry, &mut bytes)?;
        Ok(Some(bytes))
    })
    .await?
}

// ============================================================================
// Writing
// ============================================================================

/// Writes a new deflated archive
///
/// A partially written archive is removed on failure.
///
/// # Arguments
/// * `entries` - Entries in the order they should appear
/// * `dest` - Archive path; its directory is created if missing
#[instrument(skip(entries), fields(entries = entries.len()))]
pub async fn compress(entries: Vec<ArchiveEntry>, dest: &Path) -> Result<(), SyncError> {
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let result = compress_blocking(entries, &dest);
        if result.is_err() {
            let _ = std::fs::remove_file(&dest);
        }
        result
    })
    .await?
}

fn compress_blocking(entries: Vec<ArchiveEntry>, dest: &Path) -> Result<(), SyncError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = ZipWriter::new(File::create(dest)?);

    for entry in entries {
        let (bytes, modified) = match entry.source {
            ArchiveSource::File(path) => {
                let modified = std::fs::metadata(&path)?
                    .modified()
                    .ok()
                    .and_then(system_time_to_utc);
                (std::fs::read(&path)?, modified)
            }
            ArchiveSource::Bytes(bytes) => (bytes, Some(Utc::now())),
        };

        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(time) = modified.and_then(utc_to_zip_time) {
            options = options.last_modified_time(time);
        }

        writer.start_file(entry.name, options)?;
        writer.write_all(&bytes)?;
    }

    writer.finish()?;
    Ok(())
}

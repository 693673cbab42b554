//! stagesync Sync - Snapshot exchange and merge passes
//!
//! Provides:
//! - Full merge passes against a team snapshot
//! - Snapshot archive extraction and composition
//! - Local backup rotation and the remote official backup
//!
//! ## Modules
//!
//! - [`engine`] - Sync orchestrator driving one pass at a time
//! - [`store`] - Local data store adapter (atomic writes, show files)
//! - [`archive`] - Zip snapshot reading and writing
//! - [`export`] - Flattening the local store into snapshot entries
//! - [`rotation`] - Local rotation archive cleanup
//! - [`backup`] - Official remote backup refresh
//! - [`background`] - Supervised tasks that outlive a pass
//! - [`notifier`] - Tracing-backed notification adapter

pub mod archive;
pub mod background;
pub mod backup;
pub mod engine;
pub mod export;
pub mod notifier;
pub mod rotation;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;

pub use engine::{EngineSettings, SyncEngine, SyncReport, SyncRequest};

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A JSON document could not be parsed or serialized
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A snapshot archive could not be read or written
    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    /// The remote provider failed
    #[error("Provider error: {0}")]
    ProviderError(anyhow::Error),

    /// Another pass holds the busy flag
    #[error("A sync pass is already running")]
    AlreadyRunning,

    /// The scratch directory overlaps the local data directory
    #[error("Scratch directory {0} overlaps the data directory")]
    ScratchOverlapsData(PathBuf),

    /// The specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A domain-level error propagated from stagesync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] stagesync_core::domain::errors::DomainError),

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

//! stagesync Provider - Remote team storage
//!
//! Provides [`ISyncProvider`] implementations:
//! - A shared folder (local disk, NAS, or a mounted cloud drive) acting as
//!   team storage
//!
//! ## Modules
//!
//! - [`folder`] - Folder-backed provider

pub mod folder;

use std::sync::Arc;

use stagesync_core::config::ProviderConfig;
use stagesync_core::ports::{ISyncProvider, ProviderId};
use thiserror::Error;

pub use folder::FolderProvider;

/// Errors that can occur when setting up a provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required setting is missing
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Builds the provider selected in the configuration
///
/// # Errors
/// Returns error if the provider's required settings are missing
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ISyncProvider>, ProviderError> {
    match config.kind {
        ProviderId::Folder => {
            let root = config.remote_root.clone().ok_or_else(|| {
                ProviderError::NotConfigured("provider.remote_root is not set".to_string())
            })?;
            Ok(Arc::new(FolderProvider::new(root)))
        }
    }
}

//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly validation failures for identifiers read from config or snapshots.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Store name outside the `[A-Z0-9_]` alphabet
    #[error("Invalid store ID: {0}")]
    InvalidStoreId(String),

    /// Empty or otherwise unusable entity key
    #[error("Invalid entity key: {0}")]
    InvalidKey(String),

    /// Invalid device identifier
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    /// Invalid team or church reference
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Unknown sync method name
    #[error("Invalid sync method: {0}")]
    InvalidMethod(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

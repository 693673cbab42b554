//! Domain entities and business logic
//!
//! This module contains the core domain types for stagesync:
//! - Newtypes for type-safe identifiers (devices, stores, teams)
//! - Device identity resolution
//! - The Change Ledger and its marker rules
//! - Per-pass sync sessions and reconciler verdicts
//! - Entity categories and timestamp resolution
//! - Domain-specific error types

pub mod device;
pub mod entity;
pub mod errors;
pub mod ledger;
pub mod method;
pub mod newtypes;
pub mod session;

// Re-export commonly used types
pub use entity::{EntityCategory, MergeStrategy, NamingScheme};
pub use errors::DomainError;
pub use ledger::{ChangeLedger, LedgerError, MarkerKind, LEDGER_ENTRY_NAME, LEDGER_VERSION};
pub use method::SyncMethod;
pub use newtypes::*;
pub use session::{SyncSession, Verdict};

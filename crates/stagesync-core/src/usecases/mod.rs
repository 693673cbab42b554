//! Use cases (interactors) for stagesync
//!
//! This module contains the application logic that sits between domain
//! types and the adapters driving a sync pass.
//!
//! ## Use Cases
//!
//! - [`reconcile`] - Per-entity verdicts from timestamps and the change ledger

pub mod reconcile;

pub use reconcile::{
    check_cloud_entry, check_local_entry, is_cloud_newer_than_file, CloudEntry, LocalEntry,
};

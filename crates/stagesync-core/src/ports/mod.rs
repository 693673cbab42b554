//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ISyncProvider`] - Remote team storage holding snapshots and backups
//! - [`INotificationService`] - Reporting local data changes to the application

pub mod notification;
pub mod sync_provider;

pub use notification::{INotificationService, Notification, NotificationPriority};
pub use sync_provider::{ISyncProvider, ProviderId, Team};

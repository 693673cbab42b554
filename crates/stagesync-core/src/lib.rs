//! stagesync Core - Domain logic for multi-device data sync
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `ChangeLedger`, `SyncSession`, `EntityKey`, `DeviceId`
//! - **Use cases** - entity reconciliation (`check_cloud_entry`, `check_local_entry`)
//! - **Port definitions** - Traits for adapters: `ISyncProvider`, `INotificationService`
//! - **Configuration** - YAML config file loading and validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases combine domain types into sync decisions.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;

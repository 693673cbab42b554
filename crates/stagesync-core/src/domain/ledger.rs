//! Change Ledger
//!
//! The ledger is the distributed create/delete marker log shared by every
//! device of a team. It travels inside each cloud snapshot as `changes.json`
//! and lets a device tell "never existed elsewhere" apart from "deleted
//! elsewhere" without any central authority ordering the devices.
//!
//! ## Marker lifecycle
//!
//! A device that observes a creation or deletion adds itself to the marker's
//! device set. Once the set holds every known device the marker is dropped,
//! since nobody is left who could still need the signal. With fewer than two
//! known devices no markers are recorded at all.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::newtypes::DeviceId;

/// Schema version written into every ledger
pub const LEDGER_VERSION: &str = "0.1.1";

/// Archive entry name the ledger is stored under
pub const LEDGER_ENTRY_NAME: &str = "changes.json";

/// Which of the two marker maps an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Entity observed as newly created
    Created,
    /// Entity observed as deleted
    Deleted,
}

impl MarkerKind {
    /// The marker kind an operation on `self` must clear first
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            MarkerKind::Created => MarkerKind::Deleted,
            MarkerKind::Deleted => MarkerKind::Created,
        }
    }
}

impl std::fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkerKind::Created => write!(f, "created"),
            MarkerKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// Reasons a serialized ledger cannot be used as-is
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Document is not valid JSON or has the wrong shape
    #[error("Malformed ledger: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Document was written by another schema version
    #[error("Ledger version mismatch: found {found:?}, expected {LEDGER_VERSION}")]
    VersionMismatch {
        /// Version string found in the document
        found: String,
    },
}

/// Persisted change ledger (`changes.json`)
///
/// Serialized shape:
/// `{ version, devices: [id], modified: {id: epochMs}, deleted: {key: [id]}, created: {key: [id]} }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLedger {
    #[serde(default)]
    version: String,
    #[serde(default)]
    devices: Vec<DeviceId>,
    #[serde(default)]
    modified: BTreeMap<DeviceId, i64>,
    #[serde(default)]
    deleted: BTreeMap<String, Vec<DeviceId>>,
    #[serde(default)]
    created: BTreeMap<String, Vec<DeviceId>>,
}

impl Default for ChangeLedger {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION.to_string(),
            devices: Vec::new(),
            modified: BTreeMap::new(),
            deleted: BTreeMap::new(),
            created: BTreeMap::new(),
        }
    }
}

impl ChangeLedger {
    /// Creates an empty ledger at the current schema version
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a serialized ledger
    ///
    /// # Errors
    /// Returns [`LedgerError::Malformed`] for invalid JSON and
    /// [`LedgerError::VersionMismatch`] when the schema version differs.
    /// Callers treat both as "no remote ledger" and fall back to defaults.
    pub fn from_json(bytes: &[u8]) -> Result<Self, LedgerError> {
        let ledger: ChangeLedger = serde_json::from_slice(bytes)?;
        if ledger.version != LEDGER_VERSION {
            return Err(LedgerError::VersionMismatch {
                found: ledger.version,
            });
        }
        Ok(ledger)
    }

    /// Serializes the ledger for the `changes.json` archive entry
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    // --- Devices ---

    /// Schema version of this ledger
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Every device that ever participated, in join order
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Returns true if `device` has synced with this team before
    pub fn contains_device(&self, device: &DeviceId) -> bool {
        self.devices.contains(device)
    }

    /// Appends `device` to the device list if missing
    ///
    /// # Returns
    /// `true` if the device was newly registered
    pub fn register_device(&mut self, device: &DeviceId) -> bool {
        if self.contains_device(device) {
            return false;
        }
        self.devices.push(device.clone());
        true
    }

    /// Last sync timestamp (epoch ms) per device
    pub fn modified(&self) -> &BTreeMap<DeviceId, i64> {
        &self.modified
    }

    /// Records `now_ms` as the device's last sync time
    pub fn touch(&mut self, device: &DeviceId, now_ms: i64) {
        self.modified.insert(device.clone(), now_ms);
    }

    // --- Markers ---

    /// Marker map for `kind`, keyed by composite entity key
    pub fn markers(&self, kind: MarkerKind) -> &BTreeMap<String, Vec<DeviceId>> {
        match kind {
            MarkerKind::Created => &self.created,
            MarkerKind::Deleted => &self.deleted,
        }
    }

    fn markers_mut(&mut self, kind: MarkerKind) -> &mut BTreeMap<String, Vec<DeviceId>> {
        match kind {
            MarkerKind::Created => &mut self.created,
            MarkerKind::Deleted => &mut self.deleted,
        }
    }

    /// Returns true if `composite` carries a marker of `kind`
    pub fn has_marker(&self, kind: MarkerKind, composite: &str) -> bool {
        self.markers(kind).contains_key(composite)
    }

    /// Returns true if `device` is in the `kind` marker set of `composite`
    pub fn marker_includes(&self, kind: MarkerKind, composite: &str, device: &DeviceId) -> bool {
        self.markers(kind)
            .get(composite)
            .is_some_and(|devices| devices.contains(device))
    }

    /// Adds `device` to the `kind` marker of `composite`
    ///
    /// Registers the device first. Does nothing while fewer than two devices
    /// are known, and removes the marker once every known device is in it.
    pub fn mark(&mut self, kind: MarkerKind, composite: &str, device: &DeviceId) {
        self.register_device(device);
        if self.devices.len() < 2 {
            return;
        }

        let device_count = self.devices.len();
        let markers = self.markers_mut(kind);
        let set = markers.entry(composite.to_string()).or_default();
        if set.contains(device) {
            return;
        }
        set.push(device.clone());

        if set.len() >= device_count {
            markers.remove(composite);
        }
    }

    /// Removes the `kind` marker of `composite` entirely
    pub fn unmark(&mut self, kind: MarkerKind, composite: &str) {
        self.markers_mut(kind).remove(composite);
    }

    /// Adds `device` to an existing `kind` marker of `composite`
    ///
    /// Unlike [`ChangeLedger::mark`] this never creates a marker; it records
    /// that the device has caught up with a change another device announced.
    pub fn acknowledge(&mut self, kind: MarkerKind, composite: &str, device: &DeviceId) {
        if self.has_marker(kind, composite) {
            self.mark(kind, composite, device);
        }
    }

    /// Number of outstanding markers of `kind`
    pub fn marker_count(&self, kind: MarkerKind) -> usize {
        self.markers(kind).len()
    }
}

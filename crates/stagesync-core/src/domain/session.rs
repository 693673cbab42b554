//! SyncSession domain entity
//!
//! A SyncSession is constructed per pass and owns everything the reconciler
//! needs to consult: the working ledger, this device's identity, the ledger
//! exactly as it was downloaded (the pre-pass snapshot) and the set of keys
//! marked deleted during the current pass.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::ledger::{ChangeLedger, MarkerKind};
use super::newtypes::{DeviceId, EntityKey, SessionId};

/// Action taken for one entity during a merge pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Leave local and cloud untouched
    Skip,
    /// Entity is new to this device, write the cloud copy
    Create,
    /// Cloud copy is newer, overwrite local
    Download,
    /// Local wins and will be part of the next upload
    Upload,
    /// Remove the local copy
    Delete,
}

impl Verdict {
    /// Returns true if the verdict writes cloud content locally
    pub fn writes_local(&self) -> bool {
        matches!(self, Verdict::Create | Verdict::Download)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Skip => write!(f, "skip"),
            Verdict::Create => write!(f, "create"),
            Verdict::Download => write!(f, "download"),
            Verdict::Upload => write!(f, "upload"),
            Verdict::Delete => write!(f, "delete"),
        }
    }
}

/// State of one synchronization pass
#[derive(Debug, Clone)]
pub struct SyncSession {
    id: SessionId,
    device: DeviceId,
    started_at: DateTime<Utc>,
    /// Working ledger, mutated as entities are reconciled
    ledger: ChangeLedger,
    /// Ledger as downloaded, before this pass touched it
    remote: ChangeLedger,
    new_device: bool,
    deleted_now: HashSet<String>,
}

impl SyncSession {
    /// Starts a merge pass from the downloaded ledger
    ///
    /// # Arguments
    /// * `device` - This installation's identifier
    /// * `remote` - The ledger found in the snapshot, or `None` when it was
    ///   missing, malformed or from another schema version
    ///
    /// # Returns
    /// A session whose new-device flag is set when `device` is not yet listed
    /// in the remote ledger
    pub fn begin(device: DeviceId, remote: Option<ChangeLedger>) -> Self {
        let remote = remote.unwrap_or_default();
        let new_device = !remote.contains_device(&device);
        Self {
            id: SessionId::new(),
            device,
            started_at: Utc::now(),
            ledger: remote.clone(),
            remote,
            new_device,
            deleted_now: HashSet::new(),
        }
    }

    /// Starts a pass that only uploads, carrying the last known ledger
    pub fn resume(device: DeviceId, carried: ChangeLedger) -> Self {
        Self {
            id: SessionId::new(),
            device,
            started_at: Utc::now(),
            ledger: carried.clone(),
            remote: carried,
            new_device: false,
            deleted_now: HashSet::new(),
        }
    }

    // --- Getters ---

    /// Returns the session's unique identifier
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns this device's identifier
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Returns when the session started
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the working ledger
    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    /// Returns true if this device had never synced with the team before
    pub fn is_new_device(&self) -> bool {
        self.new_device
    }

    // --- Marking ---

    /// Clears any delete marker and announces `key` as created by this device
    pub fn mark_created(&mut self, key: &EntityKey) {
        let composite = key.composite();
        self.ledger.unmark(MarkerKind::Deleted, &composite);
        self.ledger.mark(MarkerKind::Created, &composite, &self.device);
    }

    /// Clears any create marker and announces `key` as deleted by this device
    pub fn mark_deleted(&mut self, key: &EntityKey) {
        let composite = key.composite();
        self.ledger.unmark(MarkerKind::Created, &composite);
        self.ledger.mark(MarkerKind::Deleted, &composite, &self.device);
        self.deleted_now.insert(composite);
    }

    /// Removes the delete marker of `key`
    pub fn unmark_deleted(&mut self, key: &EntityKey) {
        self.ledger.unmark(MarkerKind::Deleted, &key.composite());
    }

    /// Records that this device applied `verdict` for `key`
    ///
    /// Writing or keeping an entity acknowledges its create marker, removing
    /// it acknowledges its delete marker. Called only after the verdict was
    /// applied successfully.
    pub fn acknowledge(&mut self, key: &EntityKey, verdict: Verdict) {
        let kind = match verdict {
            Verdict::Create | Verdict::Download | Verdict::Upload => MarkerKind::Created,
            Verdict::Delete => MarkerKind::Deleted,
            Verdict::Skip => return,
        };
        self.ledger
            .acknowledge(kind, &key.composite(), &self.device);
    }

    // --- Queries ---

    /// True if `key` carries a create marker, or always on a new device
    pub fn is_created(&self, key: &EntityKey) -> bool {
        self.new_device || self.ledger.has_marker(MarkerKind::Created, &key.composite())
    }

    /// True if `key` carries a delete marker
    pub fn is_deleted(&self, key: &EntityKey) -> bool {
        self.ledger.has_marker(MarkerKind::Deleted, &key.composite())
    }

    /// True if the pre-pass ledger shows this device acknowledged the deletion
    ///
    /// Keys marked deleted earlier in this same pass never count.
    pub fn is_deleted_locally(&self, key: &EntityKey) -> bool {
        let composite = key.composite();
        if self.deleted_now.contains(&composite) {
            return false;
        }
        self.remote
            .marker_includes(MarkerKind::Deleted, &composite, &self.device)
    }

    /// True if the pre-pass ledger shows this device already has the entity
    pub fn is_created_locally(&self, key: &EntityKey) -> bool {
        self.remote
            .marker_includes(MarkerKind::Created, &key.composite(), &self.device)
    }

    /// Finishes the pass and returns the ledger to publish
    ///
    /// Registers this device and stamps its last sync time.
    pub fn into_ledger(mut self, now: DateTime<Utc>) -> ChangeLedger {
        self.ledger.register_device(&self.device);
        self.ledger.touch(&self.device, now.timestamp_millis());
        self.ledger
    }

    /// Snapshot of the ledger to publish, leaving the session usable
    pub fn ledger_for_upload(&self, now: DateTime<Utc>) -> ChangeLedger {
        self.clone().into_ledger(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoreId;

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id.to_string()).unwrap()
    }

    fn key(k: &str) -> EntityKey {
        EntityKey::new(StoreId::new("PROJECTS".to_string()).unwrap(), k).unwrap()
    }

    fn ledger_with(devices: &[&str]) -> ChangeLedger {
        let mut ledger = ChangeLedger::new();
        for d in devices {
            ledger.register_device(&device(d));
        }
        ledger
    }

    #[test]
    fn test_begin_without_remote_is_new_device() {
        let session = SyncSession::begin(device("a"), None);
        assert!(session.is_new_device());
        assert!(session.is_created(&key("anything")));
    }

    #[test]
    fn test_begin_known_device() {
        let session = SyncSession::begin(device("a"), Some(ledger_with(&["a", "b"])));
        assert!(!session.is_new_device());
        assert!(!session.is_created(&key("x")));
    }

    #[test]
    fn test_created_then_deleted_leaves_no_created_entry() {
        let mut session = SyncSession::begin(device("a"), Some(ledger_with(&["a", "b"])));
        session.mark_created(&key("x"));
        session.mark_deleted(&key("x"));

        assert!(!session.ledger().has_marker(MarkerKind::Created, "PROJECTS_x"));
        assert!(session.is_deleted(&key("x")));
    }

    #[test]
    fn test_deleted_now_is_not_deleted_locally() {
        let mut remote = ledger_with(&["a", "b"]);
        remote.mark(MarkerKind::Deleted, "PROJECTS_x", &device("a"));

        let mut session = SyncSession::begin(device("a"), Some(remote));
        assert!(session.is_deleted_locally(&key("x")));

        session.mark_deleted(&key("x"));
        assert!(!session.is_deleted_locally(&key("x")));
    }

    #[test]
    fn test_locally_checks_pre_pass_snapshot() {
        let mut session = SyncSession::begin(device("b"), Some(ledger_with(&["a", "b"])));
        session.mark_created(&key("x"));

        // the working ledger now lists b, the downloaded one does not
        assert!(session
            .ledger()
            .marker_includes(MarkerKind::Created, "PROJECTS_x", &device("b")));
        assert!(!session.is_created_locally(&key("x")));
    }

    #[test]
    fn test_acknowledge_clears_propagated_marker() {
        let mut remote = ledger_with(&["a", "b"]);
        remote.mark(MarkerKind::Created, "PROJECTS_x", &device("a"));

        let mut session = SyncSession::begin(device("b"), Some(remote));
        session.acknowledge(&key("x"), Verdict::Create);

        assert!(!session.is_created(&key("x")));
    }

    #[test]
    fn test_acknowledge_skip_is_noop() {
        let mut remote = ledger_with(&["a", "b"]);
        remote.mark(MarkerKind::Created, "PROJECTS_x", &device("a"));

        let mut session = SyncSession::begin(device("b"), Some(remote.clone()));
        session.acknowledge(&key("x"), Verdict::Skip);
        assert_eq!(session.ledger(), &remote);
    }

    #[test]
    fn test_into_ledger_registers_and_touches() {
        let session = SyncSession::begin(device("c"), Some(ledger_with(&["a"])));
        let now = Utc::now();
        let ledger = session.into_ledger(now);

        assert!(ledger.contains_device(&device("c")));
        assert_eq!(
            ledger.modified().get(&device("c")),
            Some(&now.timestamp_millis())
        );
    }

    #[test]
    fn test_resume_is_not_new_device() {
        let session = SyncSession::resume(device("z"), ChangeLedger::new());
        assert!(!session.is_new_device());
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Download.to_string(), "download");
        assert!(Verdict::Create.writes_local());
        assert!(!Verdict::Upload.writes_local());
    }
}

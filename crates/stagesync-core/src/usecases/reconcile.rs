//! Entity reconciliation
//!
//! Decides, for one entity, what a merge pass should do with it. The
//! decision only looks at the two copies and the session's ledger; applying
//! the verdict is left to the caller.
//!
//! | Cloud | Local | Deleted marker | Created marker / new device | Verdict |
//! |-------|-------|----------------|-----------------------------|---------|
//! | yes   | no    | yes            | -                           | skip |
//! | yes   | no    | no             | yes, not yet here           | create |
//! | yes   | no    | no             | no                          | mark deleted, skip |
//! | yes   | yes   | yes            | -                           | delete |
//! | yes   | yes   | no             | -                           | newest wins |
//! | no    | yes   | see [`check_local_entry`]                   ||

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::entity::{is_present, modified_time, stamp_modified};
use crate::domain::{EntityKey, SyncSession, Verdict};

/// Cloud side of an entity
#[derive(Debug, Clone, Copy)]
pub enum CloudEntry<'a> {
    /// A JSON value carrying its own timestamps
    Document(&'a Value),
    /// A binary file, dated by its archive entry
    File {
        /// Modification time recorded in the archive
        modified: Option<DateTime<Utc>>,
    },
}

/// Local side of an entity
#[derive(Debug)]
pub enum LocalEntry<'a> {
    /// Not present locally
    Missing,
    /// A JSON value; may be stamped with a `modified` time during comparison
    Document(&'a mut Value),
    /// A file on disk
    File {
        /// Filesystem modification time, if it could be read
        modified: Option<DateTime<Utc>>,
    },
}

impl LocalEntry<'_> {
    fn is_present(&self) -> bool {
        match self {
            LocalEntry::Missing => false,
            LocalEntry::Document(value) => is_present(value),
            LocalEntry::File { .. } => true,
        }
    }
}

/// Returns true if an archived file is newer than its local counterpart
///
/// No cloud date never wins; a local file without a readable date always
/// loses.
pub fn is_cloud_newer_than_file(
    cloud: Option<DateTime<Utc>>,
    local: Option<DateTime<Utc>>,
) -> bool {
    match (cloud, local) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(cloud), Some(local)) => cloud > local,
    }
}

/// Reconciles an entity that exists in the cloud snapshot
///
/// # Arguments
/// * `session` - Ledger state of the current pass; marked deleted when the
///   entity disappeared locally without any marker explaining it
/// * `key` - Composite key of the entity
/// * `cloud` - The snapshot's copy
/// * `local` - The local copy; an unstamped local document gets a `modified`
///   field set to now before comparing
///
/// # Returns
/// The verdict to apply
pub fn check_cloud_entry(
    session: &mut SyncSession,
    key: &EntityKey,
    cloud: CloudEntry<'_>,
    local: LocalEntry<'_>,
) -> Verdict {
    if let CloudEntry::Document(value) = cloud {
        if !value.is_null() && modified_time(value) == 0 {
            return Verdict::Skip;
        }
    }

    if !local.is_present() {
        if session.is_deleted(key) {
            return Verdict::Skip;
        }

        if session.is_created(key) && !session.is_created_locally(key) {
            return Verdict::Create;
        }

        session.mark_deleted(key);
        return Verdict::Skip;
    }

    if session.is_deleted(key) {
        return Verdict::Delete;
    }

    let cloud_is_newer = match (cloud, local) {
        (CloudEntry::File { modified }, LocalEntry::File { modified: local }) => {
            is_cloud_newer_than_file(modified, local)
        }
        (CloudEntry::File { modified }, _) => is_cloud_newer_than_file(modified, None),
        (CloudEntry::Document(cloud), LocalEntry::Document(local)) => {
            let mut local_time = modified_time(local);
            if !cloud.is_null() && local_time == 0 {
                // local wins unless the cloud copy is also stamped now
                local_time = stamp_modified(local, Utc::now().timestamp_millis());
            }
            modified_time(cloud) > local_time
        }
        (CloudEntry::Document(cloud), LocalEntry::File { modified }) => {
            let local_time = modified.map_or(0, |m| m.timestamp_millis());
            modified_time(cloud) > local_time
        }
        (CloudEntry::Document(_), LocalEntry::Missing) => false,
    };

    if cloud_is_newer {
        Verdict::Download
    } else {
        Verdict::Upload
    }
}

/// Reconciles an entity that exists locally but not in the cloud snapshot
///
/// A delete marker the device already acknowledged means the entity was
/// restored locally: the marker is turned back into a create marker and the
/// entity is kept. A delete marker not yet seen here means delete. Without
/// any marker the entity is new and announced as created.
pub fn check_local_entry(session: &mut SyncSession, key: &EntityKey) -> Verdict {
    if session.is_deleted(key) {
        if session.is_deleted_locally(key) {
            session.unmark_deleted(key);
            session.mark_created(key);
            return Verdict::Upload;
        }

        return Verdict::Delete;
    }

    session.mark_created(key);
    Verdict::Upload
}

//! Device identity
//!
//! The device id is derived once per process. The OS machine id is preferred;
//! without one the id is a SHA-256 digest of hostname, user and platform so it
//! still stays stable across restarts.

use std::path::Path;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};

use super::newtypes::DeviceId;

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

static DEVICE_ID: OnceLock<DeviceId> = OnceLock::new();

/// Returns this installation's device id, computing it on first use
pub fn local_device_id() -> &'static DeviceId {
    DEVICE_ID.get_or_init(|| {
        MACHINE_ID_PATHS
            .iter()
            .find_map(|path| read_machine_id(Path::new(path)))
            .unwrap_or_else(fallback_device_id)
    })
}

/// Resolves the device id, preferring an explicit override
pub fn resolve_device_id(configured: Option<&DeviceId>) -> DeviceId {
    configured
        .cloned()
        .unwrap_or_else(|| local_device_id().clone())
}

/// Human-readable name of this machine
pub fn local_device_name() -> String {
    whoami::devicename()
}

/// Reads a machine-id style file (one id on the first line)
pub fn read_machine_id(path: &Path) -> Option<DeviceId> {
    let content = std::fs::read_to_string(path).ok()?;
    let id = content.lines().next()?.trim();
    DeviceId::new(id.to_string()).ok()
}

/// SHA-256 of hostname + user + platform
pub fn fallback_device_id() -> DeviceId {
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| whoami::devicename());
    hash_identity(&hostname, &whoami::username(), &whoami::platform().to_string())
}

fn hash_identity(hostname: &str, user: &str, platform: &str) -> DeviceId {
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(user.as_bytes());
    hasher.update(platform.as_bytes());
    DeviceId::from_digest(format!("{:x}", hasher.finalize()))
}

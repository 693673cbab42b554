//! Sync method selection

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// How a sync pass treats local and cloud data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Bidirectional reconciliation, then upload
    #[default]
    Merge,
    /// Download and reconcile, never upload
    ReadOnly,
    /// Skip the download and publish local state as-is
    Upload,
    /// Discard local data in favour of the cloud snapshot
    Replace,
}

impl SyncMethod {
    /// Returns true if the pass never writes to the cloud
    pub fn is_read_only(&self) -> bool {
        matches!(self, SyncMethod::ReadOnly | SyncMethod::Replace)
    }

    /// Returns true for one-shot methods that fall back to merge afterwards
    pub fn is_one_shot(&self) -> bool {
        matches!(self, SyncMethod::Upload | SyncMethod::Replace)
    }

    /// Config/CLI spelling of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMethod::Merge => "merge",
            SyncMethod::ReadOnly => "read_only",
            SyncMethod::Upload => "upload",
            SyncMethod::Replace => "replace",
        }
    }
}

impl Display for SyncMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(SyncMethod::Merge),
            "read_only" | "read-only" => Ok(SyncMethod::ReadOnly),
            "upload" => Ok(SyncMethod::Upload),
            "replace" => Ok(SyncMethod::Replace),
            other => Err(DomainError::InvalidMethod(other.to_string())),
        }
    }
}

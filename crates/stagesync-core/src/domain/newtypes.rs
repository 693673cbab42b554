//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the identifiers the sync
//! engine passes around: sessions, devices, stores, teams and churches.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier for a single sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random SessionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a SessionId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid SessionId: {e}")))
    }
}

// ============================================================================
// Device identity
// ============================================================================

/// Stable identifier of one installation taking part in sync
///
/// Usually the OS machine id or a SHA-256 hex digest, but any non-empty
/// string without whitespace is accepted so a config override can pin it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new DeviceId
    ///
    /// # Errors
    /// Returns error if the id is empty or contains whitespace
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidDeviceId(
                "Device ID cannot be empty".to_string(),
            ));
        }

        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::InvalidDeviceId(format!(
                "Device ID contains whitespace: {id:?}"
            )));
        }

        Ok(Self(id))
    }

    /// Wraps a digest string that is known to be valid
    pub(crate) fn from_digest(hex: String) -> Self {
        Self(hex)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

// ============================================================================
// Store and entity identifiers
// ============================================================================

/// Name of a synchronizable category, e.g. `PROJECTS` or `SHOWS_CONTENT`
///
/// Format: upper-case ASCII letters, digits and underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreId(String);

impl StoreId {
    /// Create a new StoreId
    ///
    /// # Errors
    /// Returns error if the name is empty or uses characters outside `[A-Z0-9_]`
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidStoreId(
                "Store ID cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(DomainError::InvalidStoreId(format!(
                "Store ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StoreId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for StoreId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<StoreId> for String {
    fn from(id: StoreId) -> Self {
        id.0
    }
}

/// Composite identifier of one entity: `(store, key)`
///
/// The ledger addresses entities by [`EntityKey::composite`], which joins the
/// two parts with an underscore (`PROJECTS_abc`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    store: StoreId,
    key: String,
}

impl EntityKey {
    /// Create a new EntityKey
    ///
    /// # Errors
    /// Returns error if the key is empty
    pub fn new(store: StoreId, key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::InvalidKey(format!(
                "Entity key in store {store} cannot be empty"
            )));
        }
        Ok(Self { store, key })
    }

    /// The category this entity belongs to
    #[must_use]
    pub fn store(&self) -> &StoreId {
        &self.store
    }

    /// The entity's identifier inside its store
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ledger key, `${store}_${key}`
    #[must_use]
    pub fn composite(&self) -> String {
        format!("{}_{}", self.store, self.key)
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.store, self.key)
    }
}

// ============================================================================
// Remote references
// ============================================================================

fn validate_reference(kind: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::InvalidReference(format!(
            "{kind} reference cannot be empty"
        )));
    }

    if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(DomainError::InvalidReference(format!(
            "{kind} reference is not a single path component: {value}"
        )));
    }

    Ok(())
}

/// Reference to a team whose data is shared between devices
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TeamRef(String);

impl TeamRef {
    /// Create a new TeamRef
    ///
    /// # Errors
    /// Returns error if the reference is empty or contains path separators
    pub fn new(team: String) -> Result<Self, DomainError> {
        validate_reference("Team", &team)?;
        Ok(Self(team))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TeamRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TeamRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for TeamRef {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TeamRef> for String {
    fn from(team: TeamRef) -> Self {
        team.0
    }
}

/// Reference to the church (organisation) owning a set of teams
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChurchRef(String);

impl ChurchRef {
    /// Create a new ChurchRef
    ///
    /// # Errors
    /// Returns error if the reference is empty or contains path separators
    pub fn new(church: String) -> Result<Self, DomainError> {
        validate_reference("Church", &church)?;
        Ok(Self(church))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChurchRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChurchRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ChurchRef {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ChurchRef> for String {
    fn from(church: ChurchRef) -> Self {
        church.0
    }
}

// ============================================================================
// Tests
// ============================================================================

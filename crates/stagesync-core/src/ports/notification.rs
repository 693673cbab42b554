//! Notification service port (driven/secondary port)
//!
//! This module defines the interface the sync engine uses to tell the
//! application layer that local data changed underneath it. A desktop shell
//! reloads the affected store; the CLI just logs.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because notification delivery is adapter-specific.
//! - Notifications are fire-and-forget; the engine logs delivery failures
//!   and carries on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::newtypes::StoreId;

// ============================================================================
// Notification struct and NotificationPriority enum
// ============================================================================

/// Priority level for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    /// Low priority, may not be shown immediately
    Low,
    /// Normal priority
    #[default]
    Normal,
    /// High priority, usually a failure the user should see
    High,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// A user-facing message about a sync pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Title of the notification (short, descriptive)
    pub title: String,
    /// Body text with details about the event
    pub body: String,
    /// Priority level affecting how the notification is displayed
    pub priority: NotificationPriority,
    /// Category for grouping/filtering (e.g., "sync", "backup", "error")
    pub category: String,
}

impl Notification {
    /// Creates a new notification with the given title and body
    ///
    /// Uses `Normal` priority and an empty category by default.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            priority: NotificationPriority::Normal,
            category: String::new(),
        }
    }

    /// Sets the priority level
    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Creates a sync-related notification
    pub fn sync(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body).with_category("sync")
    }

    /// Creates an error notification with High priority
    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body)
            .with_priority(NotificationPriority::High)
            .with_category("error")
    }
}

// ============================================================================
// INotificationService trait
// ============================================================================

/// Port trait for reporting local data changes made by a sync pass
#[async_trait::async_trait]
pub trait INotificationService: Send + Sync {
    /// Sends a one-shot notification to the user
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;

    /// A document store was rewritten with new content
    ///
    /// # Arguments
    /// * `store` - The store that changed
    /// * `content` - Its full new content
    async fn store_changed(&self, store: &StoreId, content: &Value) -> anyhow::Result<()>;

    /// Show files were created or replaced
    ///
    /// # Arguments
    /// * `replaced` - Names of shows whose existing file was overwritten
    async fn shows_reloaded(&self, replaced: &[String]) -> anyhow::Result<()>;
}

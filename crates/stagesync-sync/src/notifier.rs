//! Tracing-backed notification adapter
//!
//! Used when no application shell is listening, e.g. from the CLI. Every
//! notification becomes a log event.

use serde_json::Value;
use stagesync_core::domain::StoreId;
use stagesync_core::ports::{INotificationService, Notification, NotificationPriority};
use tracing::{info, warn};

/// Notification adapter that writes to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl INotificationService for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        match notification.priority {
            NotificationPriority::High => warn!(
                title = %notification.title,
                category = %notification.category,
                "{}",
                notification.body
            ),
            _ => info!(
                title = %notification.title,
                category = %notification.category,
                "{}",
                notification.body
            ),
        }
        Ok(())
    }

    async fn store_changed(&self, store: &StoreId, content: &Value) -> anyhow::Result<()> {
        let entries = content.as_object().map_or(0, |map| map.len());
        info!(store = %store, entries, "Store updated from cloud");
        Ok(())
    }

    async fn shows_reloaded(&self, replaced: &[String]) -> anyhow::Result<()> {
        info!(replaced = replaced.len(), "Shows reloaded from cloud");
        Ok(())
    }
}

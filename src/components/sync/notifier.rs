use crate::error::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What happened to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

/// Message sent to the real-time fan-out after a local mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotification {
    pub household_id: String,
    pub event_id: String,
    pub action: EventAction,
}

/// Real-time fan-out collaborator. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &EventNotification) -> SyncResult<()>;
}

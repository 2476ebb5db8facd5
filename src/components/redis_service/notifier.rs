use super::actor::{keys, RedisActorHandle};
use crate::components::sync::notifier::{EventNotification, Notifier};
use crate::error::SyncResult;
use async_trait::async_trait;

/// Publishes event notifications on the household's Redis channel
#[derive(Clone)]
pub struct RedisNotifier {
    redis: RedisActorHandle,
}

impl RedisNotifier {
    pub fn new(redis: RedisActorHandle) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, notification: &EventNotification) -> SyncResult<()> {
        let message = serde_json::to_string(notification)?;
        self.redis
            .publish(keys::notifications(&notification.household_id), message)
            .await
    }
}

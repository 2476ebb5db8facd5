use super::models::{RemoteCalendar, RemoteEvent, TokenGrant};
use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Operations the engine needs from an external calendar service.
///
/// Every call is scoped by calendar id and authorized with the access token
/// of the account that owns the calendars. Implementations map provider
/// responses onto the error taxonomy: absent objects are
/// [`Error::NotFound`](crate::error::Error::NotFound), rejected credentials
/// [`Error::Auth`](crate::error::Error::Auth), network trouble and rate
/// limits [`Error::Transient`](crate::error::Error::Transient).
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// List events overlapping `[time_min, time_max)`
    async fn list_events(
        &self,
        token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<RemoteEvent>>;

    async fn get_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> SyncResult<RemoteEvent>;

    async fn insert_event(
        &self,
        token: &str,
        calendar_id: &str,
        event: &RemoteEvent,
    ) -> SyncResult<RemoteEvent>;

    async fn patch_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
        patch: &RemoteEvent,
    ) -> SyncResult<RemoteEvent>;

    async fn delete_event(&self, token: &str, calendar_id: &str, event_id: &str)
        -> SyncResult<()>;

    /// Native cross-calendar move. Returns
    /// [`Error::Unsupported`](crate::error::Error::Unsupported) when the
    /// provider refuses to move this kind of object at all.
    async fn move_event(
        &self,
        token: &str,
        source_calendar_id: &str,
        event_id: &str,
        destination_calendar_id: &str,
    ) -> SyncResult<RemoteEvent>;

    /// Every calendar visible to the token's account
    async fn list_calendars(&self, token: &str) -> SyncResult<Vec<RemoteCalendar>>;
}

/// OAuth token endpoint
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> SyncResult<TokenGrant>;

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> SyncResult<TokenGrant>;
}

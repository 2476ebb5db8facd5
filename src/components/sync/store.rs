use super::models::{CalendarToken, Event, Household, MemberProfile, RemoteBinding};
use crate::error::SyncResult;
use async_trait::async_trait;

/// Outcome of an unordered bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteReport {
    pub written: usize,
    /// Ids of documents that could not be written; left for the next pass
    pub failed: Vec<String>,
}

/// Local document store, the source of truth for routing state.
///
/// Events are addressable by `(household_id, id)` and, for upserts, by
/// `(household_id, remote_event_id)`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert or replace a whole event document
    async fn save_event(&self, event: &Event) -> SyncResult<()>;

    async fn get_event(&self, household_id: &str, event_id: &str) -> SyncResult<Option<Event>>;

    async fn list_events(&self, household_id: &str) -> SyncResult<Vec<Event>>;

    /// Replace only the remote binding of a stored event, returning the
    /// updated document (`None` if the event no longer exists)
    async fn set_remote_binding(
        &self,
        household_id: &str,
        event_id: &str,
        binding: Option<RemoteBinding>,
    ) -> SyncResult<Option<Event>>;

    /// Upsert remote-backed events keyed by their remote event id. A document
    /// whose remote id is already indexed replaces the indexed record, keeping
    /// that record's local id.
    async fn bulk_upsert(&self, household_id: &str, events: Vec<Event>)
        -> SyncResult<BulkWriteReport>;

    /// Delete events by local id, returning how many existed
    async fn delete_events(&self, household_id: &str, event_ids: &[String]) -> SyncResult<usize>;

    async fn delete_event(&self, household_id: &str, event_id: &str) -> SyncResult<bool> {
        Ok(self
            .delete_events(household_id, &[event_id.to_string()])
            .await?
            > 0)
    }

    async fn get_household(&self, household_id: &str) -> SyncResult<Option<Household>>;

    async fn list_profiles(&self, household_id: &str) -> SyncResult<Vec<MemberProfile>>;

    async fn save_profile(&self, profile: &MemberProfile) -> SyncResult<()>;

    /// Point a profile's binding at `calendar_id`, leaving its credentials
    /// as currently stored. Returns whether the profile exists.
    async fn set_selected_calendar(
        &self,
        household_id: &str,
        profile_id: &str,
        calendar_id: &str,
    ) -> SyncResult<bool>;

    /// Store refreshed credentials unless the stored expiry is already later.
    /// Returns whether the token was written.
    async fn update_calendar_token(
        &self,
        household_id: &str,
        profile_id: &str,
        token: CalendarToken,
    ) -> SyncResult<bool>;
}

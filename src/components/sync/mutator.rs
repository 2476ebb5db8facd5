use super::models::{
    DeleteOutcome, Event, EventPatch, Household, MemberProfile, MutationOutcome, NewEvent,
    RemoteBinding,
};
use super::moves::MoveChain;
use super::router::{resolve_target, CalendarRouter, Route};
use super::store::EventStore;
use crate::components::google_calendar::{colors, CalendarProvider, RemoteEvent};
use crate::error::{not_found_error, validation_error, Error, SyncResult};
use crate::utils::time::to_remote_range;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Household state a mutation works against
#[derive(Debug)]
pub struct HouseholdContext {
    pub household: Household,
    pub profiles: Vec<MemberProfile>,
    /// Profile of the user performing the request
    pub actor_profile_id: String,
    /// Access token of the household owner, or why there is none
    pub owner_token: SyncResult<String>,
    /// Tokens of members who connected their own account, keyed by the
    /// calendar bound to them
    pub member_tokens: HashMap<String, SyncResult<String>>,
}

impl HouseholdContext {
    /// Token to reach `calendar_id`: its member's own one, else the owner's
    pub fn calendar_token(&self, calendar_id: &str) -> &SyncResult<String> {
        self.member_tokens
            .get(calendar_id)
            .unwrap_or(&self.owner_token)
    }

    fn token_for(&self, calendar_id: &str) -> Result<&str, String> {
        self.calendar_token(calendar_id)
            .as_deref()
            .map_err(|e| format!("Calendar unavailable: {}", e))
    }
}

/// Applies local mutations and mirrors them onto the provider.
///
/// The local store is always written first; provider failures are reported
/// next to the stored event instead of failing the call.
#[derive(Clone)]
pub struct EventMutator {
    store: Arc<dyn EventStore>,
    provider: Arc<dyn CalendarProvider>,
    router: CalendarRouter,
    timezone: Tz,
}

impl EventMutator {
    pub fn new(
        store: Arc<dyn EventStore>,
        provider: Arc<dyn CalendarProvider>,
        router: CalendarRouter,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            provider,
            router,
            timezone,
        }
    }

    pub async fn create(
        &self,
        ctx: &mut HouseholdContext,
        input: NewEvent,
        now: DateTime<Utc>,
    ) -> SyncResult<MutationOutcome> {
        let title = validate_title(&input.title)?;
        validate_times(input.start, input.end)?;
        let attendees = dedup(input.attendees);

        let route = self
            .router
            .route(
                &title,
                &attendees,
                &ctx.household,
                &mut ctx.profiles,
                ctx.owner_token.as_deref().ok(),
            )
            .await?;

        let mut event = Event {
            id: Uuid::new_v4().to_string(),
            household_id: ctx.household.id.clone(),
            title,
            description: input.description,
            location: input.location,
            start: input.start,
            end: input.end,
            all_day: input.all_day,
            attendees,
            calendar_type: route.calendar_type,
            color: route.color.clone(),
            remote: None,
            recurrence: input.recurrence,
            created_by: ctx.actor_profile_id.clone(),
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.save_event(&event).await?;
        info!("Created event {} in household {}", event.id, event.household_id);

        let token = match ctx.token_for(&route.calendar_id) {
            Ok(token) => token,
            Err(sync_error) => return Ok(pending(event, sync_error)),
        };

        let payload = self.payload(&event, &route.display_title);
        match self.insert_mirror(token, &mut event, &route, &payload).await {
            Ok(remote) => Ok(MutationOutcome {
                event,
                remote: Some(remote),
                sync_error: None,
            }),
            Err(e) if e.is_local() => Err(e),
            Err(e) => {
                warn!("Event {} saved locally but not mirrored: {}", event.id, e);
                Ok(pending(event, e.to_string()))
            }
        }
    }

    pub async fn update(
        &self,
        ctx: &mut HouseholdContext,
        event_id: &str,
        patch: EventPatch,
        now: DateTime<Utc>,
    ) -> SyncResult<MutationOutcome> {
        let household_id = ctx.household.id.clone();
        let mut event = self
            .store
            .get_event(&household_id, event_id)
            .await?
            .ok_or_else(|| not_found_error(&format!("Event {}", event_id)))?;

        if let Some(title) = patch.title {
            event.title = validate_title(&title)?;
        }
        if let Some(start) = patch.start {
            event.start = start;
        }
        if let Some(end) = patch.end {
            event.end = end;
        }
        validate_times(event.start, event.end)?;
        if let Some(all_day) = patch.all_day {
            event.all_day = all_day;
        }
        if patch.description.is_some() {
            event.description = patch.description;
        }
        if patch.location.is_some() {
            event.location = patch.location;
        }
        if patch.recurrence.is_some() {
            event.recurrence = patch.recurrence;
        }

        let attendees_changed = match patch.attendees {
            Some(attendees) => {
                let attendees = dedup(attendees);
                let changed = attendees != event.attendees;
                event.attendees = attendees;
                changed
            }
            None => false,
        };

        let route = if attendees_changed {
            let route = self
                .router
                .route(
                    &event.title,
                    &event.attendees,
                    &ctx.household,
                    &mut ctx.profiles,
                    ctx.owner_token.as_deref().ok(),
                )
                .await?;
            event.color = route.color.clone();
            event.calendar_type = route.calendar_type;
            route
        } else {
            // Placement stays where it is; only the title annotation is recomputed
            let mut route = resolve_target(
                &event.title,
                &event.attendees,
                &ctx.household,
                &ctx.profiles,
                &event.color,
            );
            if let Some(current) = event.remote_calendar_id() {
                route.calendar_id = current.to_string();
            }
            route.color = event.color.clone();
            route.calendar_type = event.calendar_type;
            route
        };

        event.updated_at = now;
        self.store.save_event(&event).await?;
        debug!("Updated event {} locally", event.id);

        let payload = self.payload(&event, &route.display_title);
        let result = match event.remote.clone() {
            None => match ctx.token_for(&route.calendar_id) {
                Ok(token) => self.insert_mirror(token, &mut event, &route, &payload).await,
                Err(sync_error) => return Ok(pending(event, sync_error)),
            },
            Some(binding) if binding.calendar_id == route.calendar_id => {
                match ctx.token_for(&binding.calendar_id) {
                    Ok(token) => {
                        self.provider
                            .patch_event(token, &binding.calendar_id, &binding.event_id, &payload)
                            .await
                    }
                    Err(sync_error) => return Ok(pending(event, sync_error)),
                }
            }
            Some(binding) => {
                match (
                    ctx.token_for(&binding.calendar_id),
                    ctx.token_for(&route.calendar_id),
                ) {
                    (Ok(source), Ok(target)) => {
                        self.move_mirror(source, target, &mut event, &binding, &route, &payload)
                            .await
                    }
                    (Err(sync_error), _) | (_, Err(sync_error)) => {
                        return Ok(pending(event, sync_error))
                    }
                }
            }
        };

        match result {
            Ok(remote) => Ok(MutationOutcome {
                event,
                remote: Some(remote),
                sync_error: None,
            }),
            Err(e) if e.is_local() => Err(e),
            Err(e) => {
                warn!("Event {} updated locally but not mirrored: {}", event.id, e);
                // A partial relocation may have stored a newer binding
                let event = self
                    .store
                    .get_event(&household_id, &event.id)
                    .await?
                    .unwrap_or(event);
                Ok(pending(event, e.to_string()))
            }
        }
    }

    /// Delete remotely, then locally. The local record is removed whatever
    /// the provider answers; a failed remote delete is reported in
    /// `sync_error` and the orphaned mirror is read back by the next sync.
    pub async fn delete(&self, ctx: &HouseholdContext, event_id: &str) -> SyncResult<DeleteOutcome> {
        let household_id = &ctx.household.id;
        let event = self
            .store
            .get_event(household_id, event_id)
            .await?
            .ok_or_else(|| not_found_error(&format!("Event {}", event_id)))?;

        let mut sync_error = None;
        if let Some(binding) = &event.remote {
            let result = match ctx.token_for(&binding.calendar_id) {
                Ok(token) => match self
                    .provider
                    .delete_event(token, &binding.calendar_id, &binding.event_id)
                    .await
                {
                    // Already gone counts as deleted
                    Ok(()) | Err(Error::NotFound(_)) => Ok(()),
                    Err(e) => Err(e.to_string()),
                },
                Err(message) => Err(message),
            };

            match result {
                Ok(()) => debug!("Remote event {} removed", binding.event_id),
                Err(message) => {
                    warn!(
                        "Could not delete remote event {} ({}); deleting locally anyway",
                        binding.event_id, message
                    );
                    sync_error = Some(message);
                }
            }
        }

        let ok = self.store.delete_event(household_id, &event.id).await?;
        info!("Deleted event {} from household {}", event.id, household_id);
        Ok(DeleteOutcome { ok, sync_error })
    }

    async fn insert_mirror(
        &self,
        token: &str,
        event: &mut Event,
        route: &Route,
        payload: &RemoteEvent,
    ) -> SyncResult<RemoteEvent> {
        let remote = self
            .provider
            .insert_event(token, &route.calendar_id, payload)
            .await?;

        let binding = RemoteBinding {
            event_id: remote.id.clone(),
            calendar_id: route.calendar_id.clone(),
        };
        self.store
            .set_remote_binding(&event.household_id, &event.id, Some(binding.clone()))
            .await?;
        event.remote = Some(binding);

        debug!("Mirrored event {} as {}", event.id, remote.id);
        Ok(remote)
    }

    async fn move_mirror(
        &self,
        source_token: &str,
        target_token: &str,
        event: &mut Event,
        from: &RemoteBinding,
        route: &Route,
        payload: &RemoteEvent,
    ) -> SyncResult<RemoteEvent> {
        let chain = MoveChain {
            provider: self.provider.as_ref(),
            store: self.store.as_ref(),
            source_token,
            target_token,
            household_id: &event.household_id,
            event_id: &event.id,
        };
        let relocation = chain.relocate(from, &route.calendar_id, payload).await?;
        event.remote = Some(relocation.binding.clone());

        if relocation.recreated {
            return Ok(relocation.remote);
        }

        self.provider
            .patch_event(
                target_token,
                &relocation.binding.calendar_id,
                &relocation.binding.event_id,
                payload,
            )
            .await
    }

    /// Provider representation of a local event
    fn payload(&self, event: &Event, display_title: &str) -> RemoteEvent {
        let (start, end) = to_remote_range(event.start, event.end, event.all_day, self.timezone);
        RemoteEvent {
            summary: Some(display_title.to_string()),
            description: event.description.clone(),
            location: event.location.clone(),
            start: Some(start),
            end: Some(end),
            color_id: Some(colors::to_color_id(&event.color).to_string()),
            recurrence: event.recurrence.clone(),
            ..Default::default()
        }
    }
}

fn pending(event: Event, sync_error: String) -> MutationOutcome {
    MutationOutcome {
        event,
        remote: None,
        sync_error: Some(sync_error),
    }
}

fn validate_title(title: &str) -> SyncResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(validation_error("Title must not be empty"));
    }
    Ok(title.to_string())
}

fn validate_times(start: DateTime<Utc>, end: DateTime<Utc>) -> SyncResult<()> {
    if end < start {
        return Err(validation_error("End must not be before start"));
    }
    Ok(())
}

/// Drop repeated attendee ids, keeping the first occurrence
fn dedup(attendees: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(attendees.len());
    for attendee in attendees {
        if !unique.contains(&attendee) {
            unique.push(attendee);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_order() {
        let attendees = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(dedup(attendees), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_validation() {
        assert!(validate_title("   ").is_err());
        assert_eq!(validate_title(" Swim ").unwrap(), "Swim");

        let start = Utc::now();
        assert!(validate_times(start, start).is_ok());
        assert!(validate_times(start, start - chrono::Duration::minutes(1)).is_err());
    }
}

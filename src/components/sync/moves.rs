//! Relocating a mirrored event to another calendar.
//!
//! Each step persists the best-known binding before moving on, so an
//! interrupted relocation is resumed from wherever the object was last seen.

use super::models::RemoteBinding;
use super::store::EventStore;
use crate::components::google_calendar::{CalendarProvider, RemoteEvent};
use crate::error::{Error, SyncResult};
use tracing::{debug, info, warn};

/// Where the mirror ended up
#[derive(Debug, Clone)]
pub struct Relocation {
    pub binding: RemoteBinding,
    pub remote: RemoteEvent,
    /// The object was re-created from a copy, so it already carries `payload`
    pub recreated: bool,
}

/// Relocation of one event's mirror.
///
/// `source_token` reaches the calendar the mirror is in, `target_token` the
/// one it moves to. Native moves and lookups only happen when both are the
/// same account.
pub struct MoveChain<'a> {
    pub provider: &'a dyn CalendarProvider,
    pub store: &'a dyn EventStore,
    pub source_token: &'a str,
    pub target_token: &'a str,
    pub household_id: &'a str,
    pub event_id: &'a str,
}

impl MoveChain<'_> {
    /// Move the mirror at `from` into `target`.
    ///
    /// Tries a native move, then looks the object up across the account's
    /// writable calendars and retries from where it was found, and finally
    /// falls back to inserting a copy and deleting the original.
    pub async fn relocate(
        &self,
        from: &RemoteBinding,
        target: &str,
        payload: &RemoteEvent,
    ) -> SyncResult<Relocation> {
        if self.source_token != self.target_token {
            debug!(
                "Calendars {} and {} belong to different accounts; copying",
                from.calendar_id, target
            );
            return self.clone_and_delete(from, target, payload).await;
        }

        match self.native_move(from, target).await {
            Ok(relocation) => Ok(relocation),
            Err(Error::NotFound(_)) => {
                debug!(
                    "Remote event {} is not in calendar {}; searching",
                    from.event_id, from.calendar_id
                );
                self.locate_and_move(from, target, payload).await
            }
            Err(Error::Unsupported(reason)) => {
                debug!("Native move refused ({}); cloning instead", reason);
                self.clone_and_delete(from, target, payload).await
            }
            Err(e) => Err(e),
        }
    }

    async fn native_move(&self, from: &RemoteBinding, target: &str) -> SyncResult<Relocation> {
        let moved = self
            .provider
            .move_event(self.source_token, &from.calendar_id, &from.event_id, target)
            .await?;

        let event_id = if moved.id.is_empty() {
            from.event_id.clone()
        } else {
            moved.id.clone()
        };
        let binding = self
            .persist(RemoteBinding {
                event_id,
                calendar_id: target.to_string(),
            })
            .await?;

        info!(
            "Moved remote event {} from {} to {}",
            binding.event_id, from.calendar_id, target
        );
        Ok(Relocation {
            binding,
            remote: moved,
            recreated: false,
        })
    }

    async fn locate_and_move(
        &self,
        from: &RemoteBinding,
        target: &str,
        payload: &RemoteEvent,
    ) -> SyncResult<Relocation> {
        let Some((calendar_id, found)) = self.locate(&from.event_id, &from.calendar_id).await?
        else {
            warn!(
                "Remote event {} not found in any calendar; re-creating it in {}",
                from.event_id, target
            );
            return self.clone_and_delete(from, target, payload).await;
        };

        let current = self
            .persist(RemoteBinding {
                event_id: from.event_id.clone(),
                calendar_id,
            })
            .await?;

        if current.calendar_id == target {
            debug!("Remote event {} already lives in {}", current.event_id, target);
            return Ok(Relocation {
                binding: current,
                remote: found,
                recreated: false,
            });
        }

        match self.native_move(&current, target).await {
            Ok(relocation) => Ok(relocation),
            Err(Error::NotFound(_)) | Err(Error::Unsupported(_)) => {
                self.clone_and_delete(&current, target, payload).await
            }
            Err(e) => Err(e),
        }
    }

    /// Look the event up in every writable calendar except `skip`
    async fn locate(&self, event_id: &str, skip: &str) -> SyncResult<Option<(String, RemoteEvent)>> {
        let calendars = self.provider.list_calendars(self.source_token).await?;

        for calendar in calendars.iter().filter(|c| c.is_writable() && c.id != skip) {
            match self
                .provider
                .get_event(self.source_token, &calendar.id, event_id)
                .await
            {
                Ok(found) if !found.is_cancelled() => {
                    debug!("Found remote event {} in calendar {}", event_id, calendar.id);
                    return Ok(Some((calendar.id.clone(), found)));
                }
                Ok(_) | Err(Error::NotFound(_)) => {}
                Err(e) => warn!("Lookup in calendar {} failed: {}", calendar.id, e),
            }
        }

        Ok(None)
    }

    async fn clone_and_delete(
        &self,
        from: &RemoteBinding,
        target: &str,
        payload: &RemoteEvent,
    ) -> SyncResult<Relocation> {
        let original = match self
            .provider
            .get_event(self.source_token, &from.calendar_id, &from.event_id)
            .await
        {
            Ok(original) => Some(original),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let copy = match &original {
            Some(original) => RemoteEvent::carry_over(original, payload),
            None => RemoteEvent {
                id: String::new(),
                ..payload.clone()
            },
        };

        let inserted = self
            .provider
            .insert_event(self.target_token, target, &copy)
            .await?;
        let binding = self
            .persist(RemoteBinding {
                event_id: inserted.id.clone(),
                calendar_id: target.to_string(),
            })
            .await?;
        info!(
            "Copied remote event {} into {} as {}",
            from.event_id, target, binding.event_id
        );

        if original.is_some() {
            match self
                .provider
                .delete_event(self.source_token, &from.calendar_id, &from.event_id)
                .await
            {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => warn!(
                    "Copied event {} but could not delete the original in {}: {}",
                    from.event_id, from.calendar_id, e
                ),
            }
        }

        Ok(Relocation {
            binding,
            remote: inserted,
            recreated: true,
        })
    }

    async fn persist(&self, binding: RemoteBinding) -> SyncResult<RemoteBinding> {
        self.store
            .set_remote_binding(self.household_id, self.event_id, Some(binding.clone()))
            .await?;
        Ok(binding)
    }
}

pub mod fetcher;
pub mod models;
mod moves;
pub mod mutator;
pub mod notifier;
pub mod reconciler;
pub mod router;
pub mod store;

use crate::components::google_calendar::{CalendarProvider, TokenManager, TokenRefresher};
use crate::config::SyncSettings;
use crate::error::{auth_error, not_found_error, SyncResult};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub use fetcher::{household_calendar_ids, CalendarAccess, FetchOutcome, RemoteFetcher};
pub use models::{
    DeleteOutcome, DisplayEvent, Event, EventPatch, Household, MemberProfile, MutationOutcome,
    NewEvent, TimeWindow,
};
pub use mutator::{EventMutator, HouseholdContext};
pub use notifier::{EventAction, EventNotification, Notifier};
pub use reconciler::{ReconcileReport, Reconciler};
pub use router::{CalendarRouter, Route};
pub use store::EventStore;

/// Entry point of the synchronization engine.
///
/// Writes go local first and are mirrored onto the provider on a best-effort
/// basis; reads pull every household calendar and reconcile it into the
/// local store before returning the merged view.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    tokens: TokenManager,
    fetcher: RemoteFetcher,
    reconciler: Reconciler,
    mutator: EventMutator,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        provider: Arc<dyn CalendarProvider>,
        refresher: Arc<dyn TokenRefresher>,
        notifier: Arc<dyn Notifier>,
        settings: SyncSettings,
    ) -> Self {
        let router = CalendarRouter::new(
            store.clone(),
            provider.clone(),
            settings.default_color.clone(),
        );

        Self {
            tokens: TokenManager::new(store.clone(), refresher, settings.token_refresh_skew),
            fetcher: RemoteFetcher::new(provider.clone()),
            reconciler: Reconciler::new(
                store.clone(),
                settings.race_guard,
                settings.default_color.clone(),
                settings.timezone,
            ),
            mutator: EventMutator::new(store.clone(), provider, router, settings.timezone),
            store,
            notifier,
            settings,
        }
    }

    /// The configured look-ahead window starting now
    pub fn default_window(&self) -> TimeWindow {
        TimeWindow::upcoming(Utc::now(), self.settings.sync_window_days)
    }

    pub async fn create_event(
        &self,
        user_id: &str,
        household_id: &str,
        input: NewEvent,
    ) -> SyncResult<MutationOutcome> {
        let mut ctx = self.load_context(user_id, household_id).await?;
        let outcome = self.mutator.create(&mut ctx, input, Utc::now()).await?;
        self.notify(household_id, &outcome.event.id, EventAction::Created)
            .await;
        Ok(outcome)
    }

    pub async fn update_event(
        &self,
        user_id: &str,
        household_id: &str,
        event_id: &str,
        patch: EventPatch,
    ) -> SyncResult<MutationOutcome> {
        let mut ctx = self.load_context(user_id, household_id).await?;
        let outcome = self
            .mutator
            .update(&mut ctx, event_id, patch, Utc::now())
            .await?;
        self.notify(household_id, &outcome.event.id, EventAction::Updated)
            .await;
        Ok(outcome)
    }

    pub async fn delete_event(
        &self,
        user_id: &str,
        household_id: &str,
        event_id: &str,
    ) -> SyncResult<DeleteOutcome> {
        let ctx = self.load_context(user_id, household_id).await?;
        let outcome = self.mutator.delete(&ctx, event_id).await?;
        if outcome.ok {
            self.notify(household_id, event_id, EventAction::Deleted).await;
        }
        Ok(outcome)
    }

    /// Pull, reconcile and return the merged view of `window`.
    ///
    /// When the provider cannot be reached at all the last known local state
    /// is returned instead.
    pub async fn list_events(
        &self,
        user_id: &str,
        household_id: &str,
        window: TimeWindow,
    ) -> SyncResult<Vec<DisplayEvent>> {
        let HouseholdContext {
            household,
            profiles,
            owner_token,
            member_tokens,
            ..
        } = self.load_context(user_id, household_id).await?;

        let owner_token = match owner_token {
            Ok(token) => token,
            Err(e) if e.is_transient() => {
                warn!("Listing household {} from local state: {}", household_id, e);
                return self.local_view(household_id, &window).await;
            }
            Err(e) => return Err(e),
        };

        let mut calendars = Vec::new();
        let mut unreachable = Vec::new();
        for calendar_id in household_calendar_ids(&household, &profiles) {
            let token = match member_tokens.get(&calendar_id) {
                None => owner_token.clone(),
                Some(Ok(token)) => token.clone(),
                Some(Err(e)) => {
                    warn!("Skipping calendar {}: {}", calendar_id, e);
                    unreachable.push(calendar_id);
                    continue;
                }
            };
            calendars.push(CalendarAccess { calendar_id, token });
        }

        let mut outcome = self
            .fetcher
            .fetch_calendars(&calendars, window.start, window.end)
            .await;
        outcome.failed_calendars.extend(unreachable);

        let report = self
            .reconciler
            .reconcile(
                household_id,
                &outcome,
                &window,
                &self.color_map(&household, &profiles),
                household.family_calendar_id.as_deref(),
                Utc::now(),
            )
            .await?;
        Ok(report.display)
    }

    /// Household, members, acting profile and the tokens to reach each
    /// calendar: the owner's, plus those of members with their own account
    pub async fn load_context(
        &self,
        user_id: &str,
        household_id: &str,
    ) -> SyncResult<HouseholdContext> {
        let household = self
            .store
            .get_household(household_id)
            .await?
            .ok_or_else(|| not_found_error(&format!("Household {}", household_id)))?;
        let profiles = self.store.list_profiles(household_id).await?;

        let actor_profile_id = profiles
            .iter()
            .find(|p| p.user_id.as_deref() == Some(user_id))
            .map(|p| p.id.clone())
            .ok_or_else(|| {
                not_found_error(&format!(
                    "User {} is not a member of household {}",
                    user_id, household_id
                ))
            })?;

        let owner_token = match profiles
            .iter()
            .find(|p| p.id == household.owner_profile_id)
        {
            Some(owner) => self.tokens.ensure_valid_token(owner).await,
            None => Err(auth_error(&format!(
                "Owner profile {} of household {} does not exist",
                household.owner_profile_id, household_id
            ))),
        };
        let owner_token = match owner_token {
            Err(e) if e.is_local() => return Err(e),
            other => other,
        };

        let mut member_tokens = HashMap::new();
        for profile in profiles
            .iter()
            .filter(|p| p.id != household.owner_profile_id && p.has_credentials())
        {
            let Some(calendar_id) = profile.bound_calendar_id() else {
                continue;
            };
            let token = match self.tokens.ensure_valid_token(profile).await {
                Err(e) if e.is_local() => return Err(e),
                other => other,
            };
            member_tokens.insert(calendar_id.to_string(), token);
        }

        Ok(HouseholdContext {
            household,
            profiles,
            actor_profile_id,
            owner_token,
            member_tokens,
        })
    }

    /// Display color of events read from each household calendar
    fn color_map(
        &self,
        household: &Household,
        profiles: &[MemberProfile],
    ) -> HashMap<String, String> {
        let mut colors: HashMap<String, String> = profiles
            .iter()
            .filter_map(|p| {
                p.bound_calendar_id()
                    .map(|calendar| (calendar.to_string(), p.color.clone()))
            })
            .collect();

        if let Some(family) = &household.family_calendar_id {
            colors.insert(
                family.clone(),
                household
                    .family_color
                    .clone()
                    .unwrap_or_else(|| self.settings.default_color.clone()),
            );
        }
        colors
    }

    async fn local_view(
        &self,
        household_id: &str,
        window: &TimeWindow,
    ) -> SyncResult<Vec<DisplayEvent>> {
        let mut display: Vec<DisplayEvent> = self
            .store
            .list_events(household_id)
            .await?
            .iter()
            .filter(|e| window.overlaps(e.start, e.end))
            .map(DisplayEvent::from)
            .collect();
        display.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(display)
    }

    async fn notify(&self, household_id: &str, event_id: &str, action: EventAction) {
        let notification = EventNotification {
            household_id: household_id.to_string(),
            event_id: event_id.to_string(),
            action,
        };

        match self.notifier.notify(&notification).await {
            Ok(()) => debug!("Notified {:?} of event {}", action, event_id),
            Err(e) => warn!("Failed to notify {:?} of event {}: {}", action, event_id, e),
        }
    }
}

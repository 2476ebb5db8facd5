use super::models::{Household, MemberProfile};
use crate::components::google_calendar::{CalendarProvider, TaggedRemoteEvent};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Union of one fetch pass over several calendars
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Remote events tagged with their source calendar, unique by remote id
    pub events: Vec<TaggedRemoteEvent>,
    /// Calendars whose listing succeeded; only these may be pruned
    pub fetched_calendars: Vec<String>,
    pub failed_calendars: Vec<String>,
}

/// Every calendar the household's events can live on: each member's bound
/// calendar plus the family calendar, without duplicates
pub fn household_calendar_ids(household: &Household, profiles: &[MemberProfile]) -> Vec<String> {
    let mut ids: BTreeSet<String> = profiles
        .iter()
        .filter_map(|p| p.bound_calendar_id().map(str::to_string))
        .collect();
    if let Some(family) = &household.family_calendar_id {
        ids.insert(family.clone());
    }
    ids.into_iter().collect()
}

/// A calendar together with the access token that can read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarAccess {
    pub calendar_id: String,
    pub token: String,
}

#[derive(Clone)]
pub struct RemoteFetcher {
    provider: Arc<dyn CalendarProvider>,
}

impl RemoteFetcher {
    pub fn new(provider: Arc<dyn CalendarProvider>) -> Self {
        Self { provider }
    }

    /// List every calendar concurrently with one token. A failing calendar
    /// is excluded from the outcome without affecting the others.
    pub async fn fetch_window(
        &self,
        token: &str,
        calendar_ids: &[String],
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
    ) -> FetchOutcome {
        let calendars: Vec<CalendarAccess> = calendar_ids
            .iter()
            .map(|calendar_id| CalendarAccess {
                calendar_id: calendar_id.clone(),
                token: token.to_string(),
            })
            .collect();
        self.fetch_calendars(&calendars, time_min, time_max).await
    }

    /// Like [`fetch_window`](Self::fetch_window), reading each calendar with
    /// its own token
    pub async fn fetch_calendars(
        &self,
        calendars: &[CalendarAccess],
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
    ) -> FetchOutcome {
        let mut distinct: Vec<&CalendarAccess> = Vec::with_capacity(calendars.len());
        for access in calendars {
            if !distinct.iter().any(|d| d.calendar_id == access.calendar_id) {
                distinct.push(access);
            }
        }

        let futures = distinct.iter().map(|access| async move {
            let result = self
                .provider
                .list_events(&access.token, &access.calendar_id, time_min, time_max)
                .await;
            (access.calendar_id.clone(), result)
        });
        let results = join_all(futures).await;

        let mut outcome = FetchOutcome::default();
        let mut by_remote_id: HashMap<String, usize> = HashMap::new();

        for (calendar_id, result) in results {
            match result {
                Ok(events) => {
                    debug!("Fetched {} events from calendar {}", events.len(), calendar_id);
                    for event in events {
                        if event.is_cancelled() || event.id.is_empty() {
                            continue;
                        }
                        let tagged = TaggedRemoteEvent {
                            calendar_id: calendar_id.clone(),
                            event,
                        };
                        // Last write wins when the same id shows up twice
                        match by_remote_id.get(&tagged.event.id) {
                            Some(&index) => outcome.events[index] = tagged,
                            None => {
                                by_remote_id.insert(tagged.event.id.clone(), outcome.events.len());
                                outcome.events.push(tagged);
                            }
                        }
                    }
                    outcome.fetched_calendars.push(calendar_id);
                }
                Err(e) => {
                    warn!("Failed to fetch calendar {}: {}", calendar_id, e);
                    outcome.failed_calendars.push(calendar_id);
                }
            }
        }

        outcome
    }
}

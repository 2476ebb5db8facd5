use super::fetcher::FetchOutcome;
use super::models::{CalendarType, DisplayEvent, Event, RemoteBinding, TimeWindow};
use super::router::strip_annotation;
use super::store::EventStore;
use crate::components::google_calendar::colors;
use crate::components::google_calendar::TaggedRemoteEvent;
use crate::error::SyncResult;
use crate::utils::time::from_remote_times;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// `created_by` of records that originate on the provider
pub const REMOTE_CREATOR: &str = "remote";

/// What a reconciliation pass did
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Merged view of the window, sorted by start
    pub display: Vec<DisplayEvent>,
    /// Documents sent to the bulk upsert
    pub upserted: usize,
    /// Upserted documents whose content actually differed from the local copy
    pub changed: usize,
    pub skipped_race_guard: usize,
    pub pruned: usize,
    /// Remote ids whose write failed; retried on the next pass
    pub failed_writes: Vec<String>,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EventStore>,
    race_guard: Duration,
    default_color: String,
    timezone: Tz,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn EventStore>,
        race_guard: Duration,
        default_color: impl Into<String>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            race_guard,
            default_color: default_color.into(),
            timezone,
        }
    }

    /// Fold a fetch outcome into the local store and return the merged view.
    ///
    /// `color_map` maps calendar ids to the display color of events read
    /// from them.
    pub async fn reconcile(
        &self,
        household_id: &str,
        outcome: &FetchOutcome,
        window: &TimeWindow,
        color_map: &HashMap<String, String>,
        family_calendar_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> SyncResult<ReconcileReport> {
        let local = self.store.list_events(household_id).await?;
        let by_remote_id: HashMap<&str, &Event> = local
            .iter()
            .filter_map(|e| e.remote_event_id().map(|id| (id, e)))
            .collect();

        let mut report = ReconcileReport::default();
        let mut batch = Vec::with_capacity(outcome.events.len());

        for tagged in &outcome.events {
            let existing = by_remote_id.get(tagged.event.id.as_str()).copied();

            if existing.is_some_and(|e| e.recently_modified(now, self.race_guard)) {
                debug!("Race guard: keeping fresh local edit of {}", tagged.event.id);
                report.skipped_race_guard += 1;
                continue;
            }

            let Some(merged) = self.merge(
                household_id,
                tagged,
                existing,
                color_map,
                family_calendar_id,
                now,
            ) else {
                warn!(
                    "Skipping remote event {} with unreadable start/end",
                    tagged.event.id
                );
                continue;
            };

            if existing.map_or(true, |e| !same_content(e, &merged)) {
                report.changed += 1;
            }
            batch.push(merged);
        }

        report.upserted = batch.len();
        if !batch.is_empty() {
            let written = self.store.bulk_upsert(household_id, batch).await?;
            for failed in &written.failed {
                warn!("Upsert of remote event {} failed; retrying next sync", failed);
            }
            report.failed_writes = written.failed;
        }

        let ghosts = self.find_ghosts(&local, outcome, window, now);
        if !ghosts.is_empty() {
            report.pruned = self.store.delete_events(household_id, &ghosts).await?;
            info!(
                "Pruned {} events deleted remotely in household {}",
                report.pruned, household_id
            );
        }

        let mut display: Vec<DisplayEvent> = self
            .store
            .list_events(household_id)
            .await?
            .iter()
            .filter(|e| window.overlaps(e.start, e.end))
            .map(DisplayEvent::from)
            .collect();
        display.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        report.display = display;

        debug!(
            "Reconciled household {}: {} upserted ({} changed), {} guarded, {} pruned",
            household_id,
            report.upserted,
            report.changed,
            report.skipped_race_guard,
            report.pruned
        );
        Ok(report)
    }

    /// Build the stored form of a remote event, on top of the local record if any
    fn merge(
        &self,
        household_id: &str,
        tagged: &TaggedRemoteEvent,
        existing: Option<&Event>,
        color_map: &HashMap<String, String>,
        family_calendar_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<Event> {
        let remote = &tagged.event;
        let (start, end, all_day) =
            from_remote_times(remote.start.as_ref(), remote.end.as_ref(), self.timezone)?;

        let color = color_map
            .get(&tagged.calendar_id)
            .cloned()
            .or_else(|| {
                remote
                    .color_id
                    .as_deref()
                    .and_then(colors::to_hex)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.default_color.clone());

        let summary = remote.summary.clone().unwrap_or_default();
        let binding = Some(RemoteBinding {
            event_id: remote.id.clone(),
            calendar_id: tagged.calendar_id.clone(),
        });

        let event = match existing {
            Some(local) => Event {
                title: if local.attendees.len() >= 2 {
                    strip_annotation(&summary).to_string()
                } else {
                    summary
                },
                description: remote.description.clone(),
                location: remote.location.clone(),
                start,
                end,
                all_day,
                color,
                remote: binding,
                recurrence: remote.recurrence.clone(),
                last_synced_at: Some(now),
                ..local.clone()
            },
            None => Event {
                id: Uuid::new_v4().to_string(),
                household_id: household_id.to_string(),
                title: summary,
                description: remote.description.clone(),
                location: remote.location.clone(),
                start,
                end,
                all_day,
                attendees: Vec::new(),
                calendar_type: if family_calendar_id == Some(tagged.calendar_id.as_str()) {
                    CalendarType::Family
                } else {
                    CalendarType::Personal
                },
                color,
                remote: binding,
                recurrence: remote.recurrence.clone(),
                created_by: REMOTE_CREATOR.to_string(),
                last_synced_at: Some(now),
                created_at: now,
                updated_at: now,
            },
        };
        Some(event)
    }

    /// Local ids of bound events whose mirror disappeared from a calendar
    /// that was fetched successfully
    fn find_ghosts(
        &self,
        local: &[Event],
        outcome: &FetchOutcome,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let fetched: HashSet<&str> = outcome.fetched_calendars.iter().map(String::as_str).collect();
        let seen: HashSet<&str> = outcome.events.iter().map(|t| t.event.id.as_str()).collect();

        local
            .iter()
            .filter(|e| match &e.remote {
                Some(binding) => {
                    fetched.contains(binding.calendar_id.as_str())
                        && !seen.contains(binding.event_id.as_str())
                }
                None => false,
            })
            .filter(|e| window.overlaps(e.start, e.end))
            .filter(|e| !e.recently_modified(now, self.race_guard))
            .map(|e| e.id.clone())
            .collect()
    }
}

/// Equality ignoring sync bookkeeping
fn same_content(a: &Event, b: &Event) -> bool {
    Event {
        last_synced_at: None,
        ..a.clone()
    } == Event {
        last_synced_at: None,
        ..b.clone()
    }
}

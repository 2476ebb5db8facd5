use crate::components::google_calendar::models::RemoteEvent;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of calendar an event is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CalendarType {
    #[default]
    Personal,
    Family,
}

/// Location of an event's mirror. Both ids always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBinding {
    pub event_id: String,
    pub calendar_id: String,
}

/// Locally owned scheduling record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub household_id: String,
    /// Base title, without the attendee annotation used on family events
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    /// Member-profile ids, no duplicates, in the order they were given
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub calendar_type: CalendarType,
    pub color: String,
    #[serde(default)]
    pub remote: Option<RemoteBinding>,
    /// Provider recurrence lines (RRULE etc.), passed through untouched
    #[serde(default)]
    pub recurrence: Option<Vec<String>>,
    pub created_by: String,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Last local modification; reconciliation never bumps it
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn remote_event_id(&self) -> Option<&str> {
        self.remote.as_ref().map(|b| b.event_id.as_str())
    }

    pub fn remote_calendar_id(&self) -> Option<&str> {
        self.remote.as_ref().map(|b| b.calendar_id.as_str())
    }

    /// Whether the last local edit happened less than `guard` before `now`
    pub fn recently_modified(&self, now: DateTime<Utc>, guard: Duration) -> bool {
        now.signed_duration_since(self.updated_at) < guard
    }
}

/// OAuth credentials and the calendar selected for a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CalendarBinding {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub selected_calendar_id: Option<String>,
}

/// Household member as far as calendar sync is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub id: String,
    pub household_id: String,
    /// Application user behind this profile, if any (children may have none)
    #[serde(default)]
    pub user_id: Option<String>,
    pub display_name: String,
    pub color: String,
    /// Account identity, which is also the id of the account's primary calendar
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub calendar: Option<CalendarBinding>,
}

impl MemberProfile {
    pub fn bound_calendar_id(&self) -> Option<&str> {
        self.calendar
            .as_ref()
            .and_then(|c| c.selected_calendar_id.as_deref())
    }

    /// Whether the member connected an account of their own
    pub fn has_credentials(&self) -> bool {
        self.calendar.as_ref().is_some_and(|c| {
            c.access_token.as_deref().is_some_and(|t| !t.is_empty())
                || c.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub id: String,
    /// Profile whose calendar account holds every household calendar
    pub owner_profile_id: String,
    #[serde(default)]
    pub family_calendar_id: Option<String>,
    #[serde(default)]
    pub family_color: Option<String>,
}

/// Fresh credentials produced by a token refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Data for a new event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub recurrence: Option<Vec<String>>,
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: Option<bool>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    #[serde(default)]
    pub recurrence: Option<Vec<String>>,
}

/// Result of a create or update. The local event is always present;
/// remote trouble is reported next to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub event: Event,
    pub remote: Option<RemoteEvent>,
    pub sync_error: Option<String>,
}

/// Result of a delete. `ok` reports the local removal; a remote delete
/// that could not be carried out is described in `sync_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub ok: bool,
    pub sync_error: Option<String>,
}

/// Time range of a list request; an open end means "no upper bound"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// `days` days starting at `now`
    pub fn upcoming(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: now,
            end: Some(now + Duration::days(days)),
        }
    }

    /// Whether an event spanning `[start, end)` intersects the window
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        // Zero-length events count when they sit on the window start
        let ends_after_start = end > self.start || start >= self.start;
        let starts_before_end = self.end.map_or(true, |window_end| start < window_end);
        ends_after_start && starts_before_end
    }
}

/// Entry of the merged view returned to the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub color: String,
    pub attendees: Vec<String>,
    pub calendar_type: CalendarType,
    pub remote_event_id: Option<String>,
    pub remote_calendar_id: Option<String>,
    /// Not mirrored yet
    pub pending_sync: bool,
}

impl From<&Event> for DisplayEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: event.start,
            end: event.end,
            all_day: event.all_day,
            color: event.color.clone(),
            attendees: event.attendees.clone(),
            calendar_type: event.calendar_type,
            remote_event_id: event.remote_event_id().map(str::to_string),
            remote_calendar_id: event.remote_calendar_id().map(str::to_string),
            pending_sync: event.remote.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_window_overlap() {
        let window = TimeWindow::new(at(8), Some(at(12)));

        assert!(window.overlaps(at(9), at(10)));
        assert!(window.overlaps(at(7), at(9))); // starts before
        assert!(window.overlaps(at(11), at(13))); // ends after
        assert!(!window.overlaps(at(6), at(8))); // ends exactly at start
        assert!(!window.overlaps(at(12), at(13))); // starts exactly at end
        assert!(window.overlaps(at(8), at(8))); // instant on the start
    }

    #[test]
    fn test_open_window() {
        let window = TimeWindow::new(at(8), None);
        assert!(window.overlaps(at(20), at(21)));
        assert!(!window.overlaps(at(5), at(6)));
    }

    #[test]
    fn test_recently_modified() {
        let event = Event {
            id: "e1".to_string(),
            household_id: "h1".to_string(),
            title: "Dentist".to_string(),
            description: None,
            location: None,
            start: at(9),
            end: at(10),
            all_day: false,
            attendees: Vec::new(),
            calendar_type: CalendarType::Personal,
            color: "#EC4899".to_string(),
            remote: None,
            recurrence: None,
            created_by: "p1".to_string(),
            last_synced_at: None,
            created_at: at(8),
            updated_at: at(8),
        };

        let guard = Duration::seconds(5);
        assert!(event.recently_modified(at(8) + Duration::seconds(4), guard));
        assert!(!event.recently_modified(at(8) + Duration::seconds(5), guard));
    }
}

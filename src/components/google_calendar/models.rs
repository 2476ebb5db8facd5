use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Start or end of a remote event. Exactly one of `date_time` / `date` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Calendar event as the provider represents it on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    /// Empty when inserting; the provider assigns the id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl RemoteEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    /// Copy of `original` suitable for inserting into another calendar.
    ///
    /// Fields set on `local` win; everything else (location, description,
    /// times, color, recurrence) is carried over from the original object.
    pub fn carry_over(original: &RemoteEvent, local: &RemoteEvent) -> RemoteEvent {
        RemoteEvent {
            id: String::new(),
            summary: local.summary.clone().or_else(|| original.summary.clone()),
            description: local
                .description
                .clone()
                .or_else(|| original.description.clone()),
            location: local.location.clone().or_else(|| original.location.clone()),
            start: local.start.clone().or_else(|| original.start.clone()),
            end: local.end.clone().or_else(|| original.end.clone()),
            color_id: local.color_id.clone().or_else(|| original.color_id.clone()),
            recurrence: local
                .recurrence
                .clone()
                .or_else(|| original.recurrence.clone()),
            status: None,
        }
    }
}

/// A remote event together with the calendar it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRemoteEvent {
    pub calendar_id: String,
    pub event: RemoteEvent,
}

/// Entry of the account's calendar list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCalendar {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub summary_override: Option<String>,
    #[serde(default)]
    pub access_role: Option<String>,
    #[serde(default)]
    pub primary: Option<bool>,
}

impl RemoteCalendar {
    /// Whether events can be written to this calendar
    pub fn is_writable(&self) -> bool {
        matches!(self.access_role.as_deref(), Some("owner") | Some("writer"))
    }

    /// Name as shown to the account holder
    pub fn display_name(&self) -> &str {
        self.summary_override.as_deref().unwrap_or(&self.summary)
    }
}

/// Page of an events list response
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsPage {
    #[serde(default)]
    pub items: Vec<RemoteEvent>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Page of a calendar list response
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarListPage {
    #[serde(default)]
    pub items: Vec<RemoteCalendar>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Error body returned by the calendar API
#[derive(Debug, Deserialize, Default)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error: ApiError,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct ApiErrorItem {
    #[serde(default)]
    pub reason: Option<String>,
}

impl ApiErrorBody {
    /// Reasons listed in a raw error body; empty when it is not the usual JSON shape
    pub fn reasons(body: &str) -> Vec<String> {
        serde_json::from_str::<ApiErrorBody>(body)
            .map(|b| b.error.errors.into_iter().filter_map(|e| e.reason).collect())
            .unwrap_or_default()
    }
}

/// Result of an OAuth token exchange or refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present on code exchange and when the provider rotates refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

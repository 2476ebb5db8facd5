use super::models::{ApiErrorBody, CalendarListPage, EventsPage, RemoteCalendar, RemoteEvent};
use super::provider::CalendarProvider;
use crate::error::{config_error, Error, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Page size requested from list endpoints
const PAGE_SIZE: &str = "250";

/// Google Calendar v3 REST client
#[derive(Clone)]
pub struct GoogleCalendarClient {
    client: Client,
    base_url: Url,
}

impl GoogleCalendarClient {
    /// Create a client against `base_url` (normally the public Calendar API)
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| config_error(&format!("Invalid calendar API URL '{}': {}", base_url, e)))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// Build `{base}/{segments...}` with every segment percent-encoded
    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| config_error("Calendar API URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> SyncResult<Url> {
        self.url(&["calendars", calendar_id, "events", event_id])
    }

    /// Pass successful responses through, translate the rest into the error taxonomy
    async fn check(response: Response, context: &str) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Could not read error response".to_string());

        let message = format!("{}: HTTP {} - {}", context, status, body);
        Err(classify(status, &body, message))
    }
}

/// Reasons the API gives on a 403 that only mean "slow down"
const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

/// Map an HTTP status and its error body onto the error taxonomy
fn classify(status: StatusCode, body: &str, message: String) -> Error {
    match status {
        StatusCode::FORBIDDEN
            if ApiErrorBody::reasons(body)
                .iter()
                .any(|r| RATE_LIMIT_REASONS.contains(&r.as_str())) =>
        {
            Error::Transient(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        StatusCode::NOT_FOUND | StatusCode::GONE => Error::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => Error::Transient(message),
        s if s.is_server_error() => Error::Transient(message),
        _ => Error::Provider(message),
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn list_events(
        &self,
        token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<RemoteEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(&["calendars", calendar_id, "events"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("timeMin", &rfc3339(time_min));
                if let Some(time_max) = time_max {
                    query.append_pair("timeMax", &rfc3339(time_max));
                }
                // Recurring events are passed through as a single descriptor
                query.append_pair("singleEvents", "false");
                query.append_pair("showDeleted", "false");
                query.append_pair("maxResults", PAGE_SIZE);
                if let Some(page) = &page_token {
                    query.append_pair("pageToken", page);
                }
            }

            let response = self.client.get(url).bearer_auth(token).send().await?;
            let page: EventsPage = Self::check(response, "Failed to list events")
                .await?
                .json()
                .await?;

            events.extend(page.items);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!("Listed {} events from calendar {}", events.len(), calendar_id);
        Ok(events)
    }

    async fn get_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> SyncResult<RemoteEvent> {
        let url = self.event_url(calendar_id, event_id)?;
        let response = self.client.get(url).bearer_auth(token).send().await?;

        Ok(Self::check(response, "Failed to get event").await?.json().await?)
    }

    async fn insert_event(
        &self,
        token: &str,
        calendar_id: &str,
        event: &RemoteEvent,
    ) -> SyncResult<RemoteEvent> {
        let url = self.url(&["calendars", calendar_id, "events"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(event)
            .send()
            .await?;

        Ok(Self::check(response, "Failed to insert event").await?.json().await?)
    }

    async fn patch_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
        patch: &RemoteEvent,
    ) -> SyncResult<RemoteEvent> {
        let url = self.event_url(calendar_id, event_id)?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(token)
            .json(patch)
            .send()
            .await?;

        Ok(Self::check(response, "Failed to patch event").await?.json().await?)
    }

    async fn delete_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> SyncResult<()> {
        let url = self.event_url(calendar_id, event_id)?;
        let response = self.client.delete(url).bearer_auth(token).send().await?;

        Self::check(response, "Failed to delete event").await?;
        Ok(())
    }

    async fn move_event(
        &self,
        token: &str,
        source_calendar_id: &str,
        event_id: &str,
        destination_calendar_id: &str,
    ) -> SyncResult<RemoteEvent> {
        let mut url = self.url(&["calendars", source_calendar_id, "events", event_id, "move"])?;
        url.query_pairs_mut()
            .append_pair("destination", destination_calendar_id);

        let response = self.client.post(url).bearer_auth(token).send().await?;

        match Self::check(response, "Failed to move event").await {
            Ok(response) => Ok(response.json().await?),
            // Google answers 400 for objects it refuses to move (e.g. some recurring instances)
            Err(Error::Provider(message)) => Err(Error::Unsupported(message)),
            Err(e) => Err(e),
        }
    }

    async fn list_calendars(&self, token: &str) -> SyncResult<Vec<RemoteCalendar>> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(&["users", "me", "calendarList"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", PAGE_SIZE);
                if let Some(page) = &page_token {
                    query.append_pair("pageToken", page);
                }
            }

            let response = self.client.get(url).bearer_auth(token).send().await?;
            let page: CalendarListPage = Self::check(response, "Failed to list calendars")
                .await?
                .json()
                .await?;

            calendars.extend(page.items);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(calendars)
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use household_sync::components::google_calendar::models::{EventDateTime, TokenGrant};
use household_sync::components::google_calendar::{
    CalendarProvider, RemoteCalendar, RemoteEvent, TokenRefresher,
};
use household_sync::components::sync::models::{
    CalendarBinding, CalendarToken, Event, Household, MemberProfile, RemoteBinding,
};
use household_sync::components::sync::store::BulkWriteReport;
use household_sync::components::sync::{EventNotification, EventStore, Notifier, SyncEngine};
use household_sync::config::SyncSettings;
use household_sync::error::{
    auth_error, not_found_error, store_error, transient_error, Error, SyncResult,
};
use household_sync::utils::time::from_remote_times;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const HOUSEHOLD: &str = "h1";
pub const OWNER: &str = "p-alex";
pub const OWNER_USER: &str = "u-alex";
pub const BEA: &str = "p-bea";
pub const BEA_USER: &str = "u-bea";
pub const CODY: &str = "p-cody";

pub const ALEX_CAL: &str = "alex@example.com";
pub const BEA_CAL: &str = "bea-calendar";
pub const CODY_CAL: &str = "cody-calendar";
pub const FAMILY_CAL: &str = "family-calendar";

pub const ALEX_COLOR: &str = "#3B82F6";
pub const BEA_COLOR: &str = "#EC4899";
pub const CODY_COLOR: &str = "#10B981";
pub const FAMILY_COLOR: &str = "#8B5CF6";

/// Fixed instant used by the tests that drive the reconciler directly
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    events: HashMap<String, Event>,
    households: HashMap<String, Household>,
    profiles: HashMap<String, MemberProfile>,
    failing_remote_ids: HashSet<String>,
    failing_bindings: bool,
}

/// In-memory implementation of the event store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_household(&self, household: Household) {
        let mut state = self.state.lock().await;
        state.households.insert(household.id.clone(), household);
    }

    pub async fn put_profile(&self, profile: MemberProfile) {
        let mut state = self.state.lock().await;
        state.profiles.insert(profile.id.clone(), profile);
    }

    pub async fn put_event(&self, event: Event) {
        let mut state = self.state.lock().await;
        state.events.insert(event.id.clone(), event);
    }

    pub async fn event(&self, id: &str) -> Option<Event> {
        self.state.lock().await.events.get(id).cloned()
    }

    pub async fn events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.state.lock().await.events.values().cloned().collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        events
    }

    pub async fn event_by_remote_id(&self, remote_id: &str) -> Option<Event> {
        self.state
            .lock()
            .await
            .events
            .values()
            .find(|e| e.remote_event_id() == Some(remote_id))
            .cloned()
    }

    pub async fn profile(&self, id: &str) -> Option<MemberProfile> {
        self.state.lock().await.profiles.get(id).cloned()
    }

    /// Make every remote binding write fail
    pub async fn fail_binding_writes(&self) {
        self.state.lock().await.failing_bindings = true;
    }

    /// Make bulk writes of this remote event fail
    pub async fn fail_writes_for(&self, remote_id: &str) {
        let mut state = self.state.lock().await;
        state.failing_remote_ids.insert(remote_id.to_string());
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn save_event(&self, event: &Event) -> SyncResult<()> {
        self.put_event(event.clone()).await;
        Ok(())
    }

    async fn get_event(&self, household_id: &str, event_id: &str) -> SyncResult<Option<Event>> {
        Ok(self
            .event(event_id)
            .await
            .filter(|e| e.household_id == household_id))
    }

    async fn list_events(&self, household_id: &str) -> SyncResult<Vec<Event>> {
        Ok(self
            .events()
            .await
            .into_iter()
            .filter(|e| e.household_id == household_id)
            .collect())
    }

    async fn set_remote_binding(
        &self,
        household_id: &str,
        event_id: &str,
        binding: Option<RemoteBinding>,
    ) -> SyncResult<Option<Event>> {
        let mut state = self.state.lock().await;
        if state.failing_bindings {
            return Err(store_error("connection reset"));
        }
        match state.events.get_mut(event_id) {
            Some(event) if event.household_id == household_id => {
                event.remote = binding;
                Ok(Some(event.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn bulk_upsert(
        &self,
        household_id: &str,
        events: Vec<Event>,
    ) -> SyncResult<BulkWriteReport> {
        let mut state = self.state.lock().await;
        let mut report = BulkWriteReport::default();

        for mut event in events {
            let remote_id = event.remote_event_id().unwrap_or_default().to_string();
            if state.failing_remote_ids.contains(&remote_id) {
                report.failed.push(remote_id);
                continue;
            }

            let indexed = state
                .events
                .values()
                .find(|e| {
                    e.household_id == household_id && e.remote_event_id() == Some(remote_id.as_str())
                })
                .map(|e| e.id.clone());
            if let Some(id) = indexed {
                event.id = id;
            }

            state.events.insert(event.id.clone(), event);
            report.written += 1;
        }

        Ok(report)
    }

    async fn delete_events(&self, household_id: &str, event_ids: &[String]) -> SyncResult<usize> {
        let mut state = self.state.lock().await;
        let mut removed = 0;
        for id in event_ids {
            if state
                .events
                .get(id)
                .is_some_and(|e| e.household_id == household_id)
            {
                state.events.remove(id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn get_household(&self, household_id: &str) -> SyncResult<Option<Household>> {
        Ok(self.state.lock().await.households.get(household_id).cloned())
    }

    async fn list_profiles(&self, household_id: &str) -> SyncResult<Vec<MemberProfile>> {
        let mut profiles: Vec<MemberProfile> = self
            .state
            .lock()
            .await
            .profiles
            .values()
            .filter(|p| p.household_id == household_id)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }

    async fn save_profile(&self, profile: &MemberProfile) -> SyncResult<()> {
        self.put_profile(profile.clone()).await;
        Ok(())
    }

    async fn set_selected_calendar(
        &self,
        _household_id: &str,
        profile_id: &str,
        calendar_id: &str,
    ) -> SyncResult<bool> {
        let mut state = self.state.lock().await;
        let Some(profile) = state.profiles.get_mut(profile_id) else {
            return Ok(false);
        };
        profile
            .calendar
            .get_or_insert_with(Default::default)
            .selected_calendar_id = Some(calendar_id.to_string());
        Ok(true)
    }

    async fn update_calendar_token(
        &self,
        _household_id: &str,
        profile_id: &str,
        token: CalendarToken,
    ) -> SyncResult<bool> {
        let mut state = self.state.lock().await;
        let profile = state
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| not_found_error(profile_id))?;

        let binding = profile.calendar.get_or_insert_with(Default::default);
        if binding.expires_at.is_some_and(|stored| stored > token.expires_at) {
            return Ok(false);
        }
        binding.access_token = Some(token.access_token);
        if token.refresh_token.is_some() {
            binding.refresh_token = token.refresh_token;
        }
        binding.expires_at = Some(token.expires_at);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// How the mock answers native moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveMode {
    #[default]
    Native,
    Unsupported,
}

#[derive(Debug, Default)]
struct ProviderState {
    calendars: HashMap<String, Vec<RemoteEvent>>,
    calendar_list: Vec<RemoteCalendar>,
    failing_calendars: HashSet<String>,
    offline: bool,
    move_mode: MoveMode,
    next_id: usize,
    calls: Vec<String>,
    /// Access token each call in `calls` was made with
    tokens: Vec<String>,
}

/// Scriptable in-memory calendar provider
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_event(&self, calendar_id: &str, event: RemoteEvent) {
        let mut state = self.state.lock().await;
        state
            .calendars
            .entry(calendar_id.to_string())
            .or_default()
            .push(event);
    }

    pub async fn remove_event(&self, calendar_id: &str, event_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(events) = state.calendars.get_mut(calendar_id) {
            events.retain(|e| e.id != event_id);
        }
    }

    pub async fn events_in(&self, calendar_id: &str) -> Vec<RemoteEvent> {
        self.state
            .lock()
            .await
            .calendars
            .get(calendar_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_calendar_list(&self, calendars: Vec<RemoteCalendar>) {
        self.state.lock().await.calendar_list = calendars;
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    pub async fn fail_calendar(&self, calendar_id: &str) {
        let mut state = self.state.lock().await;
        state.failing_calendars.insert(calendar_id.to_string());
    }

    pub async fn set_move_mode(&self, mode: MoveMode) {
        self.state.lock().await.move_mode = mode;
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        let mut state = self.state.lock().await;
        state.calls.clear();
        state.tokens.clear();
    }

    /// Calls made with `token`
    pub async fn calls_with(&self, token: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .calls
            .iter()
            .zip(&state.tokens)
            .filter(|(_, used)| used.as_str() == token)
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub async fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

fn check(state: &mut ProviderState, call: String, token: &str, calendar_id: &str) -> SyncResult<()> {
    state.calls.push(call);
    state.tokens.push(token.to_string());
    if state.offline {
        return Err(transient_error("provider offline"));
    }
    if state.failing_calendars.contains(calendar_id) {
        return Err(transient_error(&format!("calendar {} unavailable", calendar_id)));
    }
    Ok(())
}

fn in_range(event: &RemoteEvent, time_min: DateTime<Utc>, time_max: Option<DateTime<Utc>>) -> bool {
    match from_remote_times(event.start.as_ref(), event.end.as_ref(), Tz::UTC) {
        Some((start, end, _)) => {
            (end > time_min || start >= time_min) && time_max.map_or(true, |max| start < max)
        }
        None => false,
    }
}

#[async_trait]
impl CalendarProvider for MockProvider {
    async fn list_events(
        &self,
        token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<RemoteEvent>> {
        let mut state = self.state.lock().await;
        check(&mut state, format!("list {}", calendar_id), token, calendar_id)?;
        Ok(state
            .calendars
            .get(calendar_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| in_range(e, time_min, time_max))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> SyncResult<RemoteEvent> {
        let mut state = self.state.lock().await;
        check(&mut state, format!("get {} {}", calendar_id, event_id), token, calendar_id)?;
        state
            .calendars
            .get(calendar_id)
            .and_then(|events| events.iter().find(|e| e.id == event_id))
            .cloned()
            .ok_or_else(|| not_found_error(event_id))
    }

    async fn insert_event(
        &self,
        token: &str,
        calendar_id: &str,
        event: &RemoteEvent,
    ) -> SyncResult<RemoteEvent> {
        let mut state = self.state.lock().await;
        check(&mut state, format!("insert {}", calendar_id), token, calendar_id)?;
        state.next_id += 1;
        let inserted = RemoteEvent {
            id: format!("remote-{}", state.next_id),
            ..event.clone()
        };
        state
            .calendars
            .entry(calendar_id.to_string())
            .or_default()
            .push(inserted.clone());
        Ok(inserted)
    }

    async fn patch_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
        patch: &RemoteEvent,
    ) -> SyncResult<RemoteEvent> {
        let mut state = self.state.lock().await;
        check(&mut state, format!("patch {} {}", calendar_id, event_id), token, calendar_id)?;
        let event = state
            .calendars
            .get_mut(calendar_id)
            .and_then(|events| events.iter_mut().find(|e| e.id == event_id))
            .ok_or_else(|| not_found_error(event_id))?;

        let merged = RemoteEvent::carry_over(event, patch);
        *event = RemoteEvent {
            id: event.id.clone(),
            ..merged
        };
        Ok(event.clone())
    }

    async fn delete_event(&self, token: &str, calendar_id: &str, event_id: &str) -> SyncResult<()> {
        let mut state = self.state.lock().await;
        check(&mut state, format!("delete {} {}", calendar_id, event_id), token, calendar_id)?;
        let events = state
            .calendars
            .get_mut(calendar_id)
            .ok_or_else(|| not_found_error(event_id))?;
        let before = events.len();
        events.retain(|e| e.id != event_id);
        if events.len() == before {
            return Err(not_found_error(event_id));
        }
        Ok(())
    }

    async fn move_event(
        &self,
        token: &str,
        source_calendar_id: &str,
        event_id: &str,
        destination_calendar_id: &str,
    ) -> SyncResult<RemoteEvent> {
        let mut state = self.state.lock().await;
        check(
            &mut state,
            format!("move {} {} {}", source_calendar_id, event_id, destination_calendar_id),
            token,
            source_calendar_id,
        )?;
        if state.move_mode == MoveMode::Unsupported {
            return Err(Error::Unsupported("event type cannot be moved".to_string()));
        }

        let source = state
            .calendars
            .get_mut(source_calendar_id)
            .ok_or_else(|| not_found_error(event_id))?;
        let index = source
            .iter()
            .position(|e| e.id == event_id)
            .ok_or_else(|| not_found_error(event_id))?;
        let event = source.remove(index);

        state
            .calendars
            .entry(destination_calendar_id.to_string())
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn list_calendars(&self, token: &str) -> SyncResult<Vec<RemoteCalendar>> {
        let mut state = self.state.lock().await;
        state.calls.push("calendars".to_string());
        state.tokens.push(token.to_string());
        if state.offline {
            return Err(transient_error("provider offline"));
        }
        Ok(state.calendar_list.clone())
    }
}

// ---------------------------------------------------------------------------
// Token endpoint and notifier
// ---------------------------------------------------------------------------

/// Token endpoint that hands out numbered access tokens
#[derive(Debug, Default)]
pub struct StaticRefresher {
    pub calls: AtomicUsize,
    pub reject: bool,
    pub rotate_refresh_token: bool,
}

impl StaticRefresher {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(&self, _refresh_token: &str) -> SyncResult<TokenGrant> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject {
            return Err(auth_error("invalid_grant"));
        }
        Ok(TokenGrant {
            access_token: format!("access-{}", n),
            refresh_token: self.rotate_refresh_token.then(|| format!("refresh-{}", n)),
            expires_in: Some(3600),
        })
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> SyncResult<TokenGrant> {
        Ok(TokenGrant {
            access_token: format!("access-for-{}", code),
            refresh_token: Some("refresh-0".to_string()),
            expires_in: None,
        })
    }
}

/// Notifier that records what it was asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<EventNotification>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn sent(&self) -> Vec<EventNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &EventNotification) -> SyncResult<()> {
        self.sent.lock().await.push(notification.clone());
        if self.fail {
            return Err(transient_error("fan-out unavailable"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn binding(calendar_id: Option<&str>) -> CalendarBinding {
    CalendarBinding {
        access_token: Some("access-0".to_string()),
        refresh_token: Some("refresh-0".to_string()),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        selected_calendar_id: calendar_id.map(str::to_string),
    }
}

pub fn profile(id: &str, user_id: Option<&str>, name: &str, color: &str) -> MemberProfile {
    MemberProfile {
        id: id.to_string(),
        household_id: HOUSEHOLD.to_string(),
        user_id: user_id.map(str::to_string),
        display_name: name.to_string(),
        color: color.to_string(),
        email: None,
        calendar: None,
    }
}

pub fn household() -> Household {
    Household {
        id: HOUSEHOLD.to_string(),
        owner_profile_id: OWNER.to_string(),
        family_calendar_id: Some(FAMILY_CAL.to_string()),
        family_color: Some(FAMILY_COLOR.to_string()),
    }
}

/// Binding for a member who connected an account of their own
pub fn own_account(calendar_id: &str, access_token: &str) -> CalendarBinding {
    CalendarBinding {
        access_token: Some(access_token.to_string()),
        refresh_token: Some(format!("{}-refresh", access_token)),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        selected_calendar_id: Some(calendar_id.to_string()),
    }
}

/// Alex owns the account, Bea is bound, Cody has no calendar yet
pub fn members() -> Vec<MemberProfile> {
    let mut alex = profile(OWNER, Some(OWNER_USER), "Alex", ALEX_COLOR);
    alex.email = Some(ALEX_CAL.to_string());
    alex.calendar = Some(binding(Some(ALEX_CAL)));

    let mut bea = profile(BEA, Some(BEA_USER), "Bea", BEA_COLOR);
    bea.calendar = Some(CalendarBinding {
        selected_calendar_id: Some(BEA_CAL.to_string()),
        ..Default::default()
    });

    let cody = profile(CODY, None, "Cody", CODY_COLOR);

    vec![alex, bea, cody]
}

pub fn writable(id: &str, name: &str) -> RemoteCalendar {
    RemoteCalendar {
        id: id.to_string(),
        summary: name.to_string(),
        access_role: Some("owner".to_string()),
        ..Default::default()
    }
}

pub fn calendar_list() -> Vec<RemoteCalendar> {
    vec![
        RemoteCalendar {
            primary: Some(true),
            ..writable(ALEX_CAL, "alex@example.com")
        },
        writable(BEA_CAL, "Bea"),
        writable(CODY_CAL, " cody "),
        writable(FAMILY_CAL, "Family"),
        RemoteCalendar {
            access_role: Some("reader".to_string()),
            ..writable("holidays", "Holidays")
        },
    ]
}

pub fn remote_event(id: &str, summary: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        summary: Some(summary.to_string()),
        start: Some(EventDateTime {
            date_time: Some(start),
            ..Default::default()
        }),
        end: Some(EventDateTime {
            date_time: Some(end),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Stored event bound to a remote mirror (or local only when `remote` is `None`)
pub fn local_event(
    id: &str,
    title: &str,
    start: DateTime<Utc>,
    remote: Option<(&str, &str)>,
    updated_at: DateTime<Utc>,
) -> Event {
    Event {
        id: id.to_string(),
        household_id: HOUSEHOLD.to_string(),
        title: title.to_string(),
        description: None,
        location: None,
        start,
        end: start + Duration::hours(1),
        all_day: false,
        attendees: Vec::new(),
        calendar_type: Default::default(),
        color: ALEX_COLOR.to_string(),
        remote: remote.map(|(event_id, calendar_id)| RemoteBinding {
            event_id: event_id.to_string(),
            calendar_id: calendar_id.to_string(),
        }),
        recurrence: None,
        created_by: OWNER.to_string(),
        last_synced_at: None,
        created_at: updated_at,
        updated_at,
    }
}

/// Engine wired to in-memory collaborators
pub struct Harness {
    pub store: MemoryStore,
    pub provider: MockProvider,
    pub refresher: Arc<StaticRefresher>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: SyncEngine,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(StaticRefresher::default(), RecordingNotifier::default()).await
    }

    pub async fn with(refresher: StaticRefresher, notifier: RecordingNotifier) -> Self {
        let store = MemoryStore::new();
        let provider = MockProvider::new();
        let refresher = Arc::new(refresher);
        let notifier = Arc::new(notifier);

        store.put_household(household()).await;
        for member in members() {
            store.put_profile(member).await;
        }
        provider.set_calendar_list(calendar_list()).await;

        let engine = SyncEngine::new(
            Arc::new(store.clone()),
            Arc::new(provider.clone()),
            refresher.clone(),
            notifier.clone(),
            SyncSettings::default(),
        );

        Self {
            store,
            provider,
            refresher,
            notifier,
            engine,
        }
    }
}

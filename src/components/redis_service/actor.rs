use crate::components::sync::models::{CalendarToken, Event, Household, MemberProfile, RemoteBinding};
use crate::components::sync::store::{BulkWriteReport, EventStore};
use crate::config::Config;
use crate::error::{not_found_error, store_error, SyncResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client as RedisClient};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Redis key layout, one namespace per household
pub mod keys {
    /// Household document (JSON string)
    pub fn household(household_id: &str) -> String {
        format!("household:{}", household_id)
    }

    /// Hash of local event id -> event JSON
    pub fn events(household_id: &str) -> String {
        format!("household:{}:events", household_id)
    }

    /// Hash of remote event id -> local event id
    pub fn remote_index(household_id: &str) -> String {
        format!("household:{}:remote_index", household_id)
    }

    /// Hash of profile id -> member profile JSON
    pub fn members(household_id: &str) -> String {
        format!("household:{}:members", household_id)
    }

    /// Pub/sub channel for real-time event notifications
    pub fn notifications(household_id: &str) -> String {
        format!("household:{}:notifications", household_id)
    }
}

type Responder<T> = mpsc::Sender<SyncResult<T>>;

/// Commands that can be sent to the Redis actor
pub enum RedisCommand {
    SaveEvent(Event, Responder<()>),
    GetEvent(String, String, Responder<Option<Event>>),
    ListEvents(String, Responder<Vec<Event>>),
    SetRemoteBinding {
        household_id: String,
        event_id: String,
        binding: Option<RemoteBinding>,
        respond: Responder<Option<Event>>,
    },
    BulkUpsert(String, Vec<Event>, Responder<BulkWriteReport>),
    DeleteEvents(String, Vec<String>, Responder<usize>),
    GetHousehold(String, Responder<Option<Household>>),
    ListProfiles(String, Responder<Vec<MemberProfile>>),
    SaveProfile(MemberProfile, Responder<()>),
    SetSelectedCalendar {
        household_id: String,
        profile_id: String,
        calendar_id: String,
        respond: Responder<bool>,
    },
    UpdateCalendarToken {
        household_id: String,
        profile_id: String,
        token: CalendarToken,
        respond: Responder<bool>,
    },
    Publish(String, String, Responder<()>),
    Shutdown,
}

/// The Redis actor that owns the connection and processes commands in order
pub struct RedisActor {
    conn: ConnectionManager,
    command_rx: mpsc::Receiver<RedisCommand>,
}

/// Handle for communicating with the Redis actor
#[derive(Clone)]
pub struct RedisActorHandle {
    command_tx: mpsc::Sender<RedisCommand>,
}

impl RedisActorHandle {
    /// Create a handle that is not connected to any actor; every request fails
    pub fn empty() -> Self {
        let (command_tx, _) = mpsc::channel(32);
        Self { command_tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Responder<T>) -> RedisCommand,
    ) -> SyncResult<T> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(command(response_tx))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Publish a message on a pub/sub channel
    pub async fn publish(&self, channel: String, message: String) -> SyncResult<()> {
        self.request(|tx| RedisCommand::Publish(channel, message, tx))
            .await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> SyncResult<()> {
        let _ = self.command_tx.send(RedisCommand::Shutdown).await;
        Ok(())
    }
}

#[async_trait]
impl EventStore for RedisActorHandle {
    async fn save_event(&self, event: &Event) -> SyncResult<()> {
        let event = event.clone();
        self.request(|tx| RedisCommand::SaveEvent(event, tx)).await
    }

    async fn get_event(&self, household_id: &str, event_id: &str) -> SyncResult<Option<Event>> {
        let (household_id, event_id) = (household_id.to_string(), event_id.to_string());
        self.request(|tx| RedisCommand::GetEvent(household_id, event_id, tx))
            .await
    }

    async fn list_events(&self, household_id: &str) -> SyncResult<Vec<Event>> {
        let household_id = household_id.to_string();
        self.request(|tx| RedisCommand::ListEvents(household_id, tx))
            .await
    }

    async fn set_remote_binding(
        &self,
        household_id: &str,
        event_id: &str,
        binding: Option<RemoteBinding>,
    ) -> SyncResult<Option<Event>> {
        let (household_id, event_id) = (household_id.to_string(), event_id.to_string());
        self.request(|respond| RedisCommand::SetRemoteBinding {
            household_id,
            event_id,
            binding,
            respond,
        })
        .await
    }

    async fn bulk_upsert(
        &self,
        household_id: &str,
        events: Vec<Event>,
    ) -> SyncResult<BulkWriteReport> {
        let household_id = household_id.to_string();
        self.request(|tx| RedisCommand::BulkUpsert(household_id, events, tx))
            .await
    }

    async fn delete_events(&self, household_id: &str, event_ids: &[String]) -> SyncResult<usize> {
        let (household_id, event_ids) = (household_id.to_string(), event_ids.to_vec());
        self.request(|tx| RedisCommand::DeleteEvents(household_id, event_ids, tx))
            .await
    }

    async fn get_household(&self, household_id: &str) -> SyncResult<Option<Household>> {
        let household_id = household_id.to_string();
        self.request(|tx| RedisCommand::GetHousehold(household_id, tx))
            .await
    }

    async fn list_profiles(&self, household_id: &str) -> SyncResult<Vec<MemberProfile>> {
        let household_id = household_id.to_string();
        self.request(|tx| RedisCommand::ListProfiles(household_id, tx))
            .await
    }

    async fn save_profile(&self, profile: &MemberProfile) -> SyncResult<()> {
        let profile = profile.clone();
        self.request(|tx| RedisCommand::SaveProfile(profile, tx))
            .await
    }

    async fn set_selected_calendar(
        &self,
        household_id: &str,
        profile_id: &str,
        calendar_id: &str,
    ) -> SyncResult<bool> {
        let (household_id, profile_id, calendar_id) = (
            household_id.to_string(),
            profile_id.to_string(),
            calendar_id.to_string(),
        );
        self.request(|respond| RedisCommand::SetSelectedCalendar {
            household_id,
            profile_id,
            calendar_id,
            respond,
        })
        .await
    }

    async fn update_calendar_token(
        &self,
        household_id: &str,
        profile_id: &str,
        token: CalendarToken,
    ) -> SyncResult<bool> {
        let (household_id, profile_id) = (household_id.to_string(), profile_id.to_string());
        self.request(|respond| RedisCommand::UpdateCalendarToken {
            household_id,
            profile_id,
            token,
            respond,
        })
        .await
    }
}

impl RedisActor {
    /// Connect to Redis and return the actor together with its handle
    pub async fn connect(config: Arc<RwLock<Config>>) -> SyncResult<(Self, RedisActorHandle)> {
        let redis_url = {
            let config_guard = config.read().await;
            config_guard.redis_url.clone()
        };

        let client = RedisClient::open(redis_url.as_str())
            .map_err(|e| store_error(&format!("Failed to create Redis client: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| store_error(&format!("Failed to connect to Redis: {}", e)))?;
        info!("Connected to Redis at {}", redis_url);

        let (command_tx, command_rx) = mpsc::channel(32);
        Ok((Self { conn, command_rx }, RedisActorHandle { command_tx }))
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Redis actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RedisCommand::SaveEvent(event, tx) => {
                    let _ = tx.send(self.save_event(&event).await).await;
                }
                RedisCommand::GetEvent(household_id, event_id, tx) => {
                    let _ = tx.send(self.get_event(&household_id, &event_id).await).await;
                }
                RedisCommand::ListEvents(household_id, tx) => {
                    let _ = tx.send(self.list_events(&household_id).await).await;
                }
                RedisCommand::SetRemoteBinding {
                    household_id,
                    event_id,
                    binding,
                    respond,
                } => {
                    let result = self
                        .set_remote_binding(&household_id, &event_id, binding)
                        .await;
                    let _ = respond.send(result).await;
                }
                RedisCommand::BulkUpsert(household_id, events, tx) => {
                    let _ = tx.send(self.bulk_upsert(&household_id, events).await).await;
                }
                RedisCommand::DeleteEvents(household_id, event_ids, tx) => {
                    let _ = tx
                        .send(self.delete_events(&household_id, &event_ids).await)
                        .await;
                }
                RedisCommand::GetHousehold(household_id, tx) => {
                    let _ = tx.send(self.get_household(&household_id).await).await;
                }
                RedisCommand::ListProfiles(household_id, tx) => {
                    let _ = tx.send(self.list_profiles(&household_id).await).await;
                }
                RedisCommand::SaveProfile(profile, tx) => {
                    let _ = tx.send(self.save_profile(&profile).await).await;
                }
                RedisCommand::SetSelectedCalendar {
                    household_id,
                    profile_id,
                    calendar_id,
                    respond,
                } => {
                    let result = self
                        .set_selected_calendar(&household_id, &profile_id, &calendar_id)
                        .await;
                    let _ = respond.send(result).await;
                }
                RedisCommand::UpdateCalendarToken {
                    household_id,
                    profile_id,
                    token,
                    respond,
                } => {
                    let result = self
                        .update_calendar_token(&household_id, &profile_id, token)
                        .await;
                    let _ = respond.send(result).await;
                }
                RedisCommand::Publish(channel, message, tx) => {
                    let _ = tx.send(self.publish(&channel, &message).await).await;
                }
                RedisCommand::Shutdown => {
                    info!("Redis actor shutting down");
                    break;
                }
            }
        }

        info!("Redis actor shut down");
    }

    /// Write an event and keep the remote index in step, in one transaction
    async fn save_event(&mut self, event: &Event) -> SyncResult<()> {
        let previous = self.get_event(&event.household_id, &event.id).await?;
        let json = serde_json::to_string(event)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(keys::events(&event.household_id), &event.id, json)
            .ignore();

        let stale = previous
            .as_ref()
            .and_then(Event::remote_event_id)
            .filter(|old| Some(*old) != event.remote_event_id());
        if let Some(old) = stale {
            pipe.hdel(keys::remote_index(&event.household_id), old)
                .ignore();
        }
        if let Some(remote_id) = event.remote_event_id() {
            pipe.hset(keys::remote_index(&event.household_id), remote_id, &event.id)
                .ignore();
        }

        let () = pipe.query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn get_event(&mut self, household_id: &str, event_id: &str) -> SyncResult<Option<Event>> {
        let json: Option<String> = self.conn.hget(keys::events(household_id), event_id).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list_events(&mut self, household_id: &str) -> SyncResult<Vec<Event>> {
        let documents: Vec<String> = self.conn.hvals(keys::events(household_id)).await?;

        let mut events = Vec::with_capacity(documents.len());
        for json in documents {
            match serde_json::from_str::<Event>(&json) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping unreadable event in household {}: {}", household_id, e),
            }
        }
        Ok(events)
    }

    async fn set_remote_binding(
        &mut self,
        household_id: &str,
        event_id: &str,
        binding: Option<RemoteBinding>,
    ) -> SyncResult<Option<Event>> {
        let Some(mut event) = self.get_event(household_id, event_id).await? else {
            return Ok(None);
        };

        event.remote = binding;
        self.save_event(&event).await?;
        debug!("Stored binding {:?} for event {}", event.remote, event_id);
        Ok(Some(event))
    }

    /// Upsert by remote id. One unordered pipeline; if it fails as a whole,
    /// documents are retried one by one and individual failures reported.
    async fn bulk_upsert(
        &mut self,
        household_id: &str,
        mut events: Vec<Event>,
    ) -> SyncResult<BulkWriteReport> {
        let remote_ids: Vec<String> = events
            .iter()
            .filter_map(|e| e.remote_event_id().map(str::to_string))
            .collect();

        if !remote_ids.is_empty() {
            let indexed: Vec<Option<String>> = redis::cmd("HMGET")
                .arg(keys::remote_index(household_id))
                .arg(&remote_ids)
                .query_async(&mut self.conn)
                .await?;
            let known: HashMap<&str, String> = remote_ids
                .iter()
                .map(String::as_str)
                .zip(indexed)
                .filter_map(|(remote_id, local_id)| local_id.map(|id| (remote_id, id)))
                .collect();

            for event in events.iter_mut() {
                if let Some(local_id) = event.remote_event_id().and_then(|r| known.get(r)) {
                    event.id = local_id.clone();
                }
            }
        }

        let mut pipe = redis::pipe();
        for event in &events {
            pipe.hset(keys::events(household_id), &event.id, serde_json::to_string(event)?)
                .ignore();
            if let Some(remote_id) = event.remote_event_id() {
                pipe.hset(keys::remote_index(household_id), remote_id, &event.id)
                    .ignore();
            }
        }

        match pipe.query_async::<()>(&mut self.conn).await {
            Ok(()) => {
                return Ok(BulkWriteReport {
                    written: events.len(),
                    failed: Vec::new(),
                })
            }
            Err(e) => warn!("Bulk upsert failed ({}); writing documents one by one", e),
        }

        let mut report = BulkWriteReport::default();
        for event in &events {
            match self.save_event(event).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    let key = event.remote_event_id().unwrap_or(&event.id).to_string();
                    warn!("Failed to write event {}: {}", key, e);
                    report.failed.push(key);
                }
            }
        }
        Ok(report)
    }

    async fn delete_events(&mut self, household_id: &str, event_ids: &[String]) -> SyncResult<usize> {
        if event_ids.is_empty() {
            return Ok(0);
        }

        let documents: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(keys::events(household_id))
            .arg(event_ids)
            .query_async(&mut self.conn)
            .await?;

        let existing = documents.iter().filter(|d| d.is_some()).count();
        let remote_ids: Vec<String> = documents
            .iter()
            .flatten()
            .filter_map(|json| serde_json::from_str::<Event>(json).ok())
            .filter_map(|e| e.remote.map(|b| b.event_id))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hdel(keys::events(household_id), event_ids)
            .ignore();
        if !remote_ids.is_empty() {
            pipe.hdel(keys::remote_index(household_id), &remote_ids)
                .ignore();
        }
        let () = pipe.query_async(&mut self.conn).await?;

        Ok(existing)
    }

    async fn get_household(&mut self, household_id: &str) -> SyncResult<Option<Household>> {
        let json: Option<String> = self.conn.get(keys::household(household_id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list_profiles(&mut self, household_id: &str) -> SyncResult<Vec<MemberProfile>> {
        let documents: Vec<String> = self.conn.hvals(keys::members(household_id)).await?;
        documents
            .iter()
            .map(|json| serde_json::from_str::<MemberProfile>(json).map_err(Into::into))
            .collect()
    }

    async fn save_profile(&mut self, profile: &MemberProfile) -> SyncResult<()> {
        let json = serde_json::to_string(profile)?;
        let () = self
            .conn
            .hset(keys::members(&profile.household_id), &profile.id, json)
            .await?;
        Ok(())
    }

    async fn get_profile(
        &mut self,
        household_id: &str,
        profile_id: &str,
    ) -> SyncResult<Option<MemberProfile>> {
        let json: Option<String> = self.conn.hget(keys::members(household_id), profile_id).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Rebind a profile's calendar on the stored document, so credentials
    /// refreshed since the caller loaded the profile are kept
    async fn set_selected_calendar(
        &mut self,
        household_id: &str,
        profile_id: &str,
        calendar_id: &str,
    ) -> SyncResult<bool> {
        let Some(mut profile) = self.get_profile(household_id, profile_id).await? else {
            return Ok(false);
        };

        profile
            .calendar
            .get_or_insert_with(Default::default)
            .selected_calendar_id = Some(calendar_id.to_string());
        self.save_profile(&profile).await?;
        Ok(true)
    }

    /// Store refreshed credentials; an expiry never moves backwards
    async fn update_calendar_token(
        &mut self,
        household_id: &str,
        profile_id: &str,
        token: CalendarToken,
    ) -> SyncResult<bool> {
        let mut profile = self
            .get_profile(household_id, profile_id)
            .await?
            .ok_or_else(|| not_found_error(&format!("Profile {}", profile_id)))?;

        let binding = profile.calendar.get_or_insert_with(Default::default);
        if binding
            .expires_at
            .is_some_and(|stored| stored > token.expires_at)
        {
            return Ok(false);
        }

        binding.access_token = Some(token.access_token);
        if token.refresh_token.is_some() {
            binding.refresh_token = token.refresh_token;
        }
        binding.expires_at = Some(token.expires_at);

        self.save_profile(&profile).await?;
        Ok(true)
    }

    async fn publish(&mut self, channel: &str, message: &str) -> SyncResult<()> {
        let receivers: i64 = self.conn.publish(channel, message).await?;
        debug!("Published to {} ({} receivers)", channel, receivers);
        Ok(())
    }
}

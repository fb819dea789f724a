// ABOUTME: In-memory test doubles for the chat host and the calendar provider.
// ABOUTME: Each records the calls it receives so tests can assert on side effects.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::Config;
use crate::context::AppContext;
use crate::error::{BridgeError, BridgeResult};
use crate::kv::MemoryKvStore;
use crate::model::{
    AvailabilityPeriod, AvailabilityRequest, AvailabilityResponse, Calendar, CalendarEvent,
    ParticipationReply, PresenceStatus, UserCredential,
};
use crate::provider::{CalendarApi, EventsQuery};
use crate::traits::ChatHost;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// MockHost
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ephemeral {
    pub user_id: String,
    pub channel_id: String,
    pub message: String,
}

/// Chat host that keeps presence in memory and records every message sent
#[derive(Clone, Default)]
pub struct MockHost {
    dms: Arc<Mutex<Vec<(String, String)>>>,
    ephemerals: Arc<Mutex<Vec<Ephemeral>>>,
    statuses: Arc<Mutex<HashMap<String, PresenceStatus>>>,
    status_updates: Arc<Mutex<Vec<(String, PresenceStatus)>>>,
    users: Arc<Mutex<HashMap<String, String>>>,
    images: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    status_update_error: Arc<Mutex<Option<String>>>,
    panic_on_lookup: Arc<Mutex<bool>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `username` resolvable to `user_id`
    pub fn with_user(self, username: &str, user_id: &str) -> Self {
        lock(&self.users).insert(username.to_string(), user_id.to_string());
        self
    }

    pub fn with_status(self, user_id: &str, status: PresenceStatus) -> Self {
        self.set_status(user_id, status);
        self
    }

    pub fn with_profile_image(self, user_id: &str, image: &[u8]) -> Self {
        lock(&self.images).insert(user_id.to_string(), image.to_vec());
        self
    }

    pub fn set_status(&self, user_id: &str, status: PresenceStatus) {
        lock(&self.statuses).insert(user_id.to_string(), status);
    }

    /// Make `find_user_id` panic, simulating a crash inside a caller's task
    pub fn panic_on_user_lookup(&self, enabled: bool) {
        *lock(&self.panic_on_lookup) = enabled;
    }

    /// Make every presence update fail with `message`
    pub fn fail_status_updates(&self, message: &str) {
        *lock(&self.status_update_error) = Some(message.to_string());
    }

    pub fn status_of(&self, user_id: &str) -> PresenceStatus {
        lock(&self.statuses)
            .get(user_id)
            .cloned()
            .unwrap_or(PresenceStatus::Online)
    }

    pub fn dms(&self) -> Vec<(String, String)> {
        lock(&self.dms).clone()
    }

    pub fn dms_for(&self, user_id: &str) -> Vec<String> {
        lock(&self.dms)
            .iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn ephemerals(&self) -> Vec<Ephemeral> {
        lock(&self.ephemerals).clone()
    }

    pub fn status_updates(&self) -> Vec<(String, PresenceStatus)> {
        lock(&self.status_updates).clone()
    }
}

#[async_trait]
impl ChatHost for MockHost {
    async fn send_direct_message(&self, user_id: &str, message: &str) -> Result<()> {
        lock(&self.dms).push((user_id.to_string(), message.to_string()));
        Ok(())
    }

    async fn send_ephemeral(&self, user_id: &str, channel_id: &str, message: &str) -> Result<()> {
        lock(&self.ephemerals).push(Ephemeral {
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn get_user_status(&self, user_id: &str) -> Result<PresenceStatus> {
        Ok(self.status_of(user_id))
    }

    async fn update_user_status(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<PresenceStatus> {
        if let Some(message) = lock(&self.status_update_error).clone() {
            anyhow::bail!("{}", message);
        }
        self.set_status(user_id, status.clone());
        lock(&self.status_updates).push((user_id.to_string(), status.clone()));
        Ok(status)
    }

    async fn find_user_id(&self, username: &str) -> Result<Option<String>> {
        if *lock(&self.panic_on_lookup) {
            panic!("user lookup crashed for {}", username);
        }
        Ok(lock(&self.users).get(username).cloned())
    }

    async fn profile_image(&self, user_id: &str) -> Result<Vec<u8>> {
        lock(&self.images)
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no profile image for {}", user_id))
    }
}

// =============================================================================
// MockCalendar
// =============================================================================

/// Scripted calendar provider
pub struct MockCalendar {
    calendars: Mutex<Vec<Calendar>>,
    events: Mutex<Vec<CalendarEvent>>,
    events_error: Mutex<Option<String>>,
    available_periods: Mutex<Vec<AvailabilityPeriod>>,
    participation_status: Mutex<u16>,
    channel_failures: Mutex<VecDeque<String>>,
    credential: Mutex<UserCredential>,
    exchange_delay: Mutex<Option<Duration>>,
    exchange_error: Mutex<Option<String>>,

    pub event_queries: Mutex<Vec<EventsQuery>>,
    pub availability_requests: Mutex<Vec<AvailabilityRequest>>,
    pub participation_calls: Mutex<Vec<(String, String, ParticipationReply)>>,
    pub channel_calls: Mutex<Vec<String>>,
    pub exchange_calls: Mutex<Vec<(String, String)>>,
}

impl Default for MockCalendar {
    fn default() -> Self {
        Self {
            calendars: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            events_error: Mutex::new(None),
            available_periods: Mutex::new(Vec::new()),
            participation_status: Mutex::new(202),
            channel_failures: Mutex::new(VecDeque::new()),
            credential: Mutex::new(UserCredential {
                access_token: "access-token".to_string(),
                sub: "acc_sub".to_string(),
                ..Default::default()
            }),
            exchange_delay: Mutex::new(None),
            exchange_error: Mutex::new(None),
            event_queries: Mutex::new(Vec::new()),
            availability_requests: Mutex::new(Vec::new()),
            participation_calls: Mutex::new(Vec::new()),
            channel_calls: Mutex::new(Vec::new()),
            exchange_calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_calendars(&self, calendars: Vec<Calendar>) {
        *lock(&self.calendars) = calendars;
    }

    pub fn set_events(&self, events: Vec<CalendarEvent>) {
        *lock(&self.events) = events;
    }

    pub fn fail_events(&self, message: &str) {
        *lock(&self.events_error) = Some(message.to_string());
    }

    /// Any non-empty set means the user is free in the look-ahead window
    pub fn set_available(&self, free: bool) {
        let periods = if free {
            vec![AvailabilityPeriod {
                start: "2024-01-01T10:02:00Z".to_string(),
                end: "2024-01-01T10:15:00Z".to_string(),
            }]
        } else {
            Vec::new()
        };
        *lock(&self.available_periods) = periods;
    }

    pub fn set_participation_status(&self, status: u16) {
        *lock(&self.participation_status) = status;
    }

    /// Fail the next `count` channel creations with `message`
    pub fn fail_channel_creations(&self, count: usize, message: &str) {
        let mut failures = lock(&self.channel_failures);
        for _ in 0..count {
            failures.push_back(message.to_string());
        }
    }

    pub fn set_credential(&self, credential: UserCredential) {
        *lock(&self.credential) = credential;
    }

    /// Hold every code exchange for `delay` before answering
    pub fn delay_exchanges(&self, delay: Duration) {
        *lock(&self.exchange_delay) = Some(delay);
    }

    pub fn fail_exchanges(&self, message: &str) {
        *lock(&self.exchange_error) = Some(message.to_string());
    }

    pub fn channel_call_count(&self) -> usize {
        lock(&self.channel_calls).len()
    }

    pub fn exchange_call_count(&self) -> usize {
        lock(&self.exchange_calls).len()
    }
}

#[async_trait]
impl CalendarApi for MockCalendar {
    async fn list_calendars(&self, _access_token: &str) -> BridgeResult<Vec<Calendar>> {
        Ok(lock(&self.calendars).clone())
    }

    async fn list_events(
        &self,
        _access_token: &str,
        query: &EventsQuery,
    ) -> BridgeResult<Vec<CalendarEvent>> {
        lock(&self.event_queries).push(query.clone());
        if let Some(message) = lock(&self.events_error).clone() {
            return Err(BridgeError::Upstream(message));
        }
        Ok(lock(&self.events).clone())
    }

    async fn availability(
        &self,
        _access_token: &str,
        request: &AvailabilityRequest,
    ) -> BridgeResult<AvailabilityResponse> {
        lock(&self.availability_requests).push(request.clone());
        Ok(AvailabilityResponse {
            available_periods: lock(&self.available_periods).clone(),
        })
    }

    async fn set_participation(
        &self,
        _access_token: &str,
        calendar_id: &str,
        event_uid: &str,
        reply: ParticipationReply,
    ) -> BridgeResult<u16> {
        lock(&self.participation_calls).push((
            calendar_id.to_string(),
            event_uid.to_string(),
            reply,
        ));
        Ok(*lock(&self.participation_status))
    }

    async fn create_channel(&self, _access_token: &str, callback_url: &str) -> BridgeResult<String> {
        lock(&self.channel_calls).push(callback_url.to_string());
        if let Some(message) = lock(&self.channel_failures).pop_front() {
            return Err(BridgeError::Upstream(message));
        }
        Ok(serde_json::json!({
            "channel": {
                "channel_id": "chn_1",
                "callback_url": callback_url,
                "filters": {}
            }
        })
        .to_string())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> BridgeResult<UserCredential> {
        lock(&self.exchange_calls).push((code.to_string(), redirect_uri.to_string()));
        let delay = *lock(&self.exchange_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = lock(&self.exchange_error).clone() {
            return Err(BridgeError::Upstream(message));
        }
        Ok(lock(&self.credential).clone())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A configuration that passes validation
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.site_url = "https://chat.example.com".to_string();
    config.server.internal_secret = "internal-secret".to_string();
    config.provider.client_id = "client-id".to_string();
    config.provider.client_secret = "client-secret".to_string();
    config
}

/// Context wired to in-memory doubles
pub fn test_context(
    config: Config,
    calendar: Arc<MockCalendar>,
    host: Arc<MockHost>,
) -> Arc<AppContext> {
    AppContext::new(config, Arc::new(MemoryKvStore::new()), calendar, host)
}

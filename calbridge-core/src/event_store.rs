// ABOUTME: Durable cache of the last-known snapshot of each calendar event, keyed by event uid.
// ABOUTME: The whole map is persisted as one value; writers are serialized by an async lock.
use anyhow::Context;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::{BridgeError, BridgeResult};
use crate::model::CalendarEvent;
use crate::store::{BridgeStore, CALENDAR_EVENTS_KEY};

pub type EventMap = HashMap<String, CalendarEvent>;

pub struct EventStore {
    store: BridgeStore,
    write_lock: Mutex<()>,
}

impl EventStore {
    pub fn new(store: BridgeStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Merge events into the cache (last write wins per uid) and persist the map
    pub async fn put(&self, events: &[CalendarEvent]) -> BridgeResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut all = self.load()?;
        for event in events {
            all.insert(event.event_uid.clone(), event.clone());
        }
        self.store
            .set_json(CALENDAR_EVENTS_KEY, &all)
            .context("Failed to persist calendar events")
            .map_err(BridgeError::Store)?;

        tracing::debug!(written = events.len(), total = all.len(), "Event store updated");
        Ok(())
    }

    pub fn get(&self, event_uid: &str) -> BridgeResult<CalendarEvent> {
        self.load()?
            .remove(event_uid)
            .ok_or_else(|| BridgeError::EventNotFound(event_uid.to_string()))
    }

    pub fn get_all(&self) -> BridgeResult<EventMap> {
        self.load()
    }

    fn load(&self) -> BridgeResult<EventMap> {
        self.store
            .get_json::<EventMap>(CALENDAR_EVENTS_KEY)
            .context("Failed to load calendar events")
            .map(Option::unwrap_or_default)
            .map_err(BridgeError::Store)
    }
}

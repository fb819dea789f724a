// ABOUTME: Calendar change reconciliation and presence automation engine
// ABOUTME: Host-agnostic core: webhook dispatch, OAuth handshake, availability, scheduling, commands

pub mod auth;
pub mod availability;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod event_store;
pub mod format;
pub mod kv;
pub mod metrics;
pub mod model;
pub mod notifications;
pub mod oauth;
pub mod participation;
pub mod provider;
pub mod scheduler;
pub mod slash;
pub mod store;
pub mod subscription;
pub mod testing;
pub mod traits;

pub use config::Config;
pub use context::AppContext;
pub use error::{BridgeError, BridgeResult};

// Re-export boundary traits and their implementations
pub use kv::{KvStore, MemoryKvStore, SqliteKvStore};
pub use provider::{CalendarApi, CronofyClient, EventsQuery};
pub use traits::ChatHost;

// Data types
pub use model::{
    Calendar, CalendarEvent, ParticipationReply, ParticipationStatus, PresenceStatus,
    SubscriptionState, SubscriptionStatus, UserCredential,
};

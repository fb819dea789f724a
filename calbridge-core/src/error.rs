// ABOUTME: Error taxonomy for the bridge boundary (HTTP handlers, commands, jobs)
// ABOUTME: Each variant knows the HTTP status it maps to; internals use anyhow with context

use reqwest::StatusCode;
use thiserror::Error;

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or invalid shared secret, or missing authenticated user
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// OAuth callback state did not match the stored handshake token
    #[error("calendar provider supplied incorrect state for OAuth connect")]
    StateMismatch,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Webhook body could not be decoded
    #[error("{0}")]
    InvalidPayload(String),

    #[error("{0}")]
    InvalidTimestamp(String),

    #[error("Unsupported webhook message type: {0}")]
    UnsupportedNotification(String),

    #[error("no calendar account connected for user {0}")]
    NotConnected(String),

    #[error("No calendars found")]
    NoCalendars,

    #[error("event {0} not found in event store")]
    EventNotFound(String),

    /// Provider API failure or non-success status
    #[error("{0}")]
    Upstream(String),

    #[error("Failed to change event's status.")]
    ParticipationRejected { status: u16 },

    #[error("store error: {0:#}")]
    Store(anyhow::Error),

    #[error("chat host error: {0:#}")]
    Host(anyhow::Error),
}

impl BridgeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BridgeError::StateMismatch | BridgeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::UnsupportedNotification(_) | BridgeError::EventNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            BridgeError::InvalidPayload(_)
            | BridgeError::InvalidTimestamp(_)
            | BridgeError::NotConnected(_)
            | BridgeError::NoCalendars
            | BridgeError::Upstream(_)
            | BridgeError::ParticipationRejected { .. }
            | BridgeError::Store(_)
            | BridgeError::Host(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn upstream(context: &str, err: impl std::fmt::Display) -> Self {
        BridgeError::Upstream(format!("{}: {}", context, err))
    }
}

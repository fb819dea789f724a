// ABOUTME: Data model shared by the engine: events, calendars, credentials, presence
// ABOUTME: Wire shapes follow the calendar provider's JSON; timestamps use a fixed UTC format

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Timestamp layout used by the provider for event times and change notifications
pub const PROVIDER_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse a provider timestamp such as `2023-01-01T00:00:00Z`
pub fn parse_provider_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, PROVIDER_DATETIME_FORMAT).map(|naive| naive.and_utc())
}

pub fn format_provider_time(value: DateTime<Utc>) -> String {
    value.format(PROVIDER_DATETIME_FORMAT).to_string()
}

// =============================================================================
// Calendar events
// =============================================================================

/// A user's recorded response to an invitation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ParticipationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipationStatus::NeedsAction => "needs_action",
            ParticipationStatus::Accepted => "accepted",
            ParticipationStatus::Declined => "declined",
            ParticipationStatus::Tentative => "tentative",
            ParticipationStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reply the user can send back to the provider for an invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationReply {
    Accepted,
    Declined,
    Tentative,
}

impl ParticipationReply {
    pub const ALL: [ParticipationReply; 3] = [
        ParticipationReply::Accepted,
        ParticipationReply::Declined,
        ParticipationReply::Tentative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipationReply::Accepted => "accepted",
            ParticipationReply::Declined => "declined",
            ParticipationReply::Tentative => "tentative",
        }
    }

    /// Markdown link label shown next to an invitation
    pub fn label(&self) -> &'static str {
        match self {
            ParticipationReply::Accepted => "Accept",
            ParticipationReply::Declined => "Decline",
            ParticipationReply::Tentative => "Tentative",
        }
    }
}

impl fmt::Display for ParticipationReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipationReply {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(ParticipationReply::Accepted),
            "declined" => Ok(ParticipationReply::Declined),
            "tentative" => Ok(ParticipationReply::Tentative),
            _ => anyhow::bail!("Unknown participation status: {}", s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub calendar_id: String,
    pub event_uid: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub organizer: Organizer,
    #[serde(default)]
    pub participation_status: ParticipationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl CalendarEvent {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        parse_provider_time(&self.start).ok()
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        parse_provider_time(&self.end).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub profile_name: String,
    pub calendar_id: String,
    #[serde(default)]
    pub calendar_name: String,
    #[serde(default)]
    pub calendar_readonly: bool,
    #[serde(default)]
    pub calendar_deleted: bool,
    #[serde(default)]
    pub calendar_primary: bool,
}

/// Human-readable provider name for messages and pages
pub fn pretty_provider_name(provider: &str) -> &str {
    match provider {
        "google" => "Google",
        "live_connect" => "Outlook",
        other => other,
    }
}

// =============================================================================
// Credentials
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingProfile {
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub profile_name: String,
}

/// Access credentials returned by the provider's token endpoint
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub account_id: String,
    /// Provider-side subject used in availability queries
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub linking_profile: LinkingProfile,
}

// Custom Debug impl to redact tokens
impl fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("account_id", &self.account_id)
            .field("sub", &self.sub)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("linking_profile", &self.linking_profile)
            .finish()
    }
}

// =============================================================================
// Webhook notifications
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMeta {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub changes_since: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default)]
    pub filters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookMessage {
    pub notification: NotificationMeta,
    #[serde(default)]
    pub channel: NotificationChannel,
}

/// Outcome of the most recent webhook subscription attempt for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Active,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub state: SubscriptionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub attempts: u32,
    pub updated_at: String,
}

// =============================================================================
// Presence
// =============================================================================

/// Chat presence as exposed by the host; only `Dnd` and `Online` are ever written
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
    Dnd,
    Other(String),
}

impl PresenceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Offline => "offline",
            PresenceStatus::Dnd => "dnd",
            PresenceStatus::Other(s) => s,
        }
    }

    pub fn is_dnd(&self) -> bool {
        matches!(self, PresenceStatus::Dnd)
    }
}

impl From<&str> for PresenceStatus {
    fn from(value: &str) -> Self {
        match value {
            "online" => PresenceStatus::Online,
            "away" => PresenceStatus::Away,
            "offline" => PresenceStatus::Offline,
            "dnd" => PresenceStatus::Dnd,
            other => PresenceStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for PresenceStatus {
    fn from(value: String) -> Self {
        PresenceStatus::from(value.as_str())
    }
}

impl From<PresenceStatus> for String {
    fn from(value: PresenceStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Availability
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityMember {
    pub sub: String,
    pub calendar_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityParticipant {
    pub members: Vec<AvailabilityMember>,
    pub required: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityDuration {
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPeriod {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBuffer {
    pub before: AvailabilityDuration,
    pub after: AvailabilityDuration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub participants: Vec<AvailabilityParticipant>,
    pub required_duration: AvailabilityDuration,
    pub available_periods: Vec<AvailabilityPeriod>,
    pub buffer: AvailabilityBuffer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    #[serde(default)]
    pub available_periods: Vec<AvailabilityPeriod>,
}

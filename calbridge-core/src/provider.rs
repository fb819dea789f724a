// ABOUTME: Calendar provider REST boundary: calendars, events, availability, participation, channels
// ABOUTME: CronofyClient speaks JSON over HTTPS with a fixed request timeout
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::model::{
    format_provider_time, AvailabilityRequest, AvailabilityResponse, Calendar, CalendarEvent,
    ParticipationReply, UserCredential,
};

const MAX_EVENT_PAGES: usize = 50;

/// Filter for an events listing; results are always expressed in UTC
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventsQuery {
    pub last_modified: Option<DateTime<Utc>>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub calendar_ids: Vec<String>,
}

impl EventsQuery {
    /// Events changed since `ts`, across every calendar
    pub fn modified_since(ts: DateTime<Utc>) -> Self {
        Self {
            last_modified: Some(ts),
            ..Default::default()
        }
    }

    pub fn window(from: NaiveDate, to: NaiveDate, calendar_ids: Vec<String>) -> Self {
        Self {
            last_modified: None,
            from: Some(from),
            to: Some(to),
            calendar_ids,
        }
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("tzid".to_string(), "UTC".to_string())];
        if let Some(ts) = self.last_modified {
            pairs.push(("last_modified".into(), format_provider_time(ts)));
        }
        if let Some(from) = self.from {
            pairs.push(("from".into(), from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.to {
            pairs.push(("to".into(), to.format("%Y-%m-%d").to_string()));
        }
        for id in &self.calendar_ids {
            pairs.push(("calendar_ids[]".into(), id.clone()));
        }
        pairs
    }
}

/// Calendar provider operations used by the engine
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_calendars(&self, access_token: &str) -> BridgeResult<Vec<Calendar>>;

    async fn list_events(
        &self,
        access_token: &str,
        query: &EventsQuery,
    ) -> BridgeResult<Vec<CalendarEvent>>;

    async fn availability(
        &self,
        access_token: &str,
        request: &AvailabilityRequest,
    ) -> BridgeResult<AvailabilityResponse>;

    /// Returns the raw HTTP status; the caller decides what counts as success
    async fn set_participation(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_uid: &str,
        reply: ParticipationReply,
    ) -> BridgeResult<u16>;

    /// Create a push notification channel; returns the provider's raw response body
    async fn create_channel(&self, access_token: &str, callback_url: &str) -> BridgeResult<String>;

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> BridgeResult<UserCredential>;
}

#[derive(Debug, Deserialize)]
struct CalendarsResponse {
    #[serde(default)]
    calendars: Vec<Calendar>,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    events: Vec<CalendarEvent>,
    #[serde(default)]
    pages: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Clone)]
pub struct CronofyClient {
    http: Client,
    api_base: String,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for CronofyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronofyClient")
            .field("api_base", &self.api_base)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl CronofyClient {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            http,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> BridgeResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| BridgeError::upstream("Invalid provider base URL", e))?;
        url.path_segments_mut()
            .map_err(|_| BridgeError::Upstream("Provider base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> BridgeResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BridgeError::Upstream(format!(
            "Provider returned status {} {}",
            status.as_u16(),
            body
        )))
    }
}

#[async_trait]
impl CalendarApi for CronofyClient {
    async fn list_calendars(&self, access_token: &str) -> BridgeResult<Vec<Calendar>> {
        let url = self.endpoint(&["v1", "calendars"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BridgeError::upstream("Calendar list request failed", e))?;
        let parsed: CalendarsResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| BridgeError::upstream("Failed to parse calendar list", e))?;
        Ok(parsed.calendars)
    }

    async fn list_events(
        &self,
        access_token: &str,
        query: &EventsQuery,
    ) -> BridgeResult<Vec<CalendarEvent>> {
        let mut url = self.endpoint(&["v1", "events"])?;
        url.query_pairs_mut().extend_pairs(query.query_pairs());
        let api_origin = url.origin();

        let mut events = Vec::new();
        for page in 0..MAX_EVENT_PAGES {
            let response = self
                .http
                .get(url.clone())
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| BridgeError::upstream("Events request failed", e))?;
            let parsed: EventsPage = Self::check(response)
                .await?
                .json()
                .await
                .map_err(|e| BridgeError::upstream("Failed to parse events", e))?;
            events.extend(parsed.events);

            match parsed.pages.and_then(|p| p.next_page) {
                Some(next) => {
                    let next_url = Url::parse(&next)
                        .map_err(|e| BridgeError::upstream("Invalid next page URL", e))?;
                    // The bearer token only goes to the provider API host
                    if next_url.origin() != api_origin {
                        tracing::warn!(next_page = %next_url, "Refusing off-origin events page");
                        return Err(BridgeError::Upstream(format!(
                            "Next page URL {} is outside the provider API",
                            next_url
                        )));
                    }
                    url = next_url;
                    tracing::debug!(page = page + 1, "Following events pagination");
                }
                None => return Ok(events),
            }
        }

        tracing::warn!(
            pages = MAX_EVENT_PAGES,
            events = events.len(),
            "Event listing truncated at page limit"
        );
        Ok(events)
    }

    async fn availability(
        &self,
        access_token: &str,
        request: &AvailabilityRequest,
    ) -> BridgeResult<AvailabilityResponse> {
        let url = self.endpoint(&["v1", "availability"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| BridgeError::upstream("Availability request failed", e))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| BridgeError::upstream("Failed to parse availability", e))
    }

    async fn set_participation(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_uid: &str,
        reply: ParticipationReply,
    ) -> BridgeResult<u16> {
        let url = self.endpoint(&[
            "v1",
            "calendars",
            calendar_id,
            "events",
            event_uid,
            "participation_status",
        ])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "status": reply.as_str() }))
            .send()
            .await
            .map_err(|e| BridgeError::upstream("Participation request failed", e))?;
        Ok(response.status().as_u16())
    }

    async fn create_channel(&self, access_token: &str, callback_url: &str) -> BridgeResult<String> {
        let url = self.endpoint(&["v1", "channels"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "callback_url": callback_url }))
            .send()
            .await
            .map_err(|e| BridgeError::upstream("Channel request failed", e))?;
        Self::check(response)
            .await?
            .text()
            .await
            .map_err(|e| BridgeError::upstream("Failed to read channel response", e))
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> BridgeResult<UserCredential> {
        let url = self.endpoint(&["oauth", "token"])?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "grant_type": "authorization_code",
                "code": code,
                "redirect_uri": redirect_uri,
            }))
            .send()
            .await
            .map_err(|e| BridgeError::upstream("Token request failed", e))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| BridgeError::upstream("Failed to parse token response", e))
    }
}

// ABOUTME: Standalone chat host: presence lives in the local key-value store
// ABOUTME: Direct and ephemeral messages are relayed to an optional outgoing webhook

use anyhow::{Context, Result};
use async_trait::async_trait;
use calbridge_core::config::RelayConfig;
use calbridge_core::{ChatHost, KvStore, PresenceStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const RELAY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn presence_key(user_id: &str) -> String {
    format!("presence_{}", user_id)
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
    ephemeral: bool,
    text: &'a str,
}

/// Host used when the bridge runs on its own rather than inside a chat server.
///
/// Usernames are user ids. There are no avatars, so pages fall back to the
/// default image.
pub struct RelayHost {
    kv: Arc<dyn KvStore>,
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl RelayHost {
    pub fn new(kv: Arc<dyn KvStore>, config: &RelayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .context("Failed to build relay HTTP client")?;
        Ok(Self {
            kv,
            http,
            webhook_url: config.webhook_url.clone().filter(|u| !u.trim().is_empty()),
        })
    }

    async fn relay(&self, message: RelayMessage<'_>) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            tracing::info!(
                user_id = %message.user_id,
                ephemeral = message.ephemeral,
                text = %message.text,
                "Message for user (no relay configured)"
            );
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .json(&message)
            .send()
            .await
            .context("Relay request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Relay webhook returned status {}", status.as_u16());
        }
        tracing::debug!(user_id = %message.user_id, "Message relayed");
        Ok(())
    }
}

#[async_trait]
impl ChatHost for RelayHost {
    async fn send_direct_message(&self, user_id: &str, message: &str) -> Result<()> {
        self.relay(RelayMessage {
            user_id,
            channel_id: None,
            ephemeral: false,
            text: message,
        })
        .await
    }

    async fn send_ephemeral(&self, user_id: &str, channel_id: &str, message: &str) -> Result<()> {
        self.relay(RelayMessage {
            user_id,
            channel_id: Some(channel_id),
            ephemeral: true,
            text: message,
        })
        .await
    }

    async fn get_user_status(&self, user_id: &str) -> Result<PresenceStatus> {
        let Some(raw) = self.kv.get(&presence_key(user_id))? else {
            return Ok(PresenceStatus::Online);
        };
        let value = String::from_utf8(raw).context("Stored presence is not UTF-8")?;
        Ok(PresenceStatus::from(value))
    }

    async fn update_user_status(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<PresenceStatus> {
        self.kv
            .set(&presence_key(user_id), status.as_str().as_bytes())
            .with_context(|| format!("Failed to store presence for {}", user_id))?;
        tracing::info!(user_id = %user_id, status = %status, "Presence updated");
        Ok(status)
    }

    async fn find_user_id(&self, username: &str) -> Result<Option<String>> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(None);
        }
        Ok(Some(username.to_string()))
    }

    async fn profile_image(&self, user_id: &str) -> Result<Vec<u8>> {
        anyhow::bail!("no profile image available for {}", user_id)
    }
}

// ABOUTME: Boundary trait for the chat host the bridge runs inside of
// ABOUTME: Direct messages, ephemeral replies, presence, user lookup, profile images

use anyhow::Result;
use async_trait::async_trait;

use crate::model::PresenceStatus;

// =============================================================================
// Chat Host
// =============================================================================

/// Everything the engine needs from the chat system.
///
/// The engine never holds a direct reference to a concrete chat platform; the
/// HTTP server, scheduler, and command handlers all go through this trait so a
/// test double or a standalone relay can stand in for the real host.
#[async_trait]
pub trait ChatHost: Send + Sync {
    /// Send a direct message from the bot to a user
    async fn send_direct_message(&self, user_id: &str, message: &str) -> Result<()>;

    /// Post a message only `user_id` can see in `channel_id`
    async fn send_ephemeral(&self, user_id: &str, channel_id: &str, message: &str) -> Result<()>;

    async fn get_user_status(&self, user_id: &str) -> Result<PresenceStatus>;

    /// Apply a presence status; returns the status the host actually recorded
    async fn update_user_status(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<PresenceStatus>;

    /// Resolve a username to a user id; `None` when no such user exists
    async fn find_user_id(&self, username: &str) -> Result<Option<String>>;

    /// Raw image bytes (PNG) for the user's avatar
    async fn profile_image(&self, user_id: &str) -> Result<Vec<u8>>;
}

/// Best-effort DM: failures are logged and swallowed
pub async fn notify(host: &dyn ChatHost, user_id: &str, message: &str) {
    if let Err(e) = host.send_direct_message(user_id, message).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to send direct message");
    }
}

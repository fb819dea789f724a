// ABOUTME: Webhook ingestion: authenticates the callback, decodes it, and dispatches by type
// ABOUTME: `change` goes to the participation change handler, `verification` gets a welcome DM

use reqwest::StatusCode;

use crate::auth::secret_matches;
use crate::context::AppContext;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::model::WebhookMessage;
use crate::participation;
use crate::traits::notify;

pub const VERIFICATION_MESSAGE: &str = "You will now receive notifications from your calendar!";

/// Entry point for `POST <base>/webhook?user_id=&secret=`
pub async fn handle_webhook(
    ctx: &AppContext,
    user_id: &str,
    secret: &str,
    body: &[u8],
) -> BridgeResult<StatusCode> {
    let result = dispatch(ctx, user_id, secret, body).await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(BridgeError::Unauthorized(_)) => "unauthorized",
        Err(BridgeError::InvalidPayload(_)) => "bad_payload",
        Err(BridgeError::UnsupportedNotification(_)) => "unsupported",
        Err(_) => "error",
    };
    metrics::record_webhook_request(outcome);
    result
}

async fn dispatch(
    ctx: &AppContext,
    user_id: &str,
    secret: &str,
    body: &[u8],
) -> BridgeResult<StatusCode> {
    let configured = ctx.config().server.internal_secret.clone();
    if user_id.is_empty() || !secret_matches(&configured, secret) {
        tracing::warn!(user_id = %user_id, "Rejected webhook with bad credentials");
        return Err(BridgeError::Unauthorized("not authorized".to_string()));
    }

    let message: WebhookMessage = match serde_json::from_slice(body) {
        Ok(m) => m,
        Err(e) => {
            notify(ctx.host.as_ref(), user_id, &e.to_string()).await;
            return Err(BridgeError::InvalidPayload(e.to_string()));
        }
    };

    tracing::debug!(
        user_id = %user_id,
        kind = %message.notification.kind,
        channel_id = %message.channel.channel_id,
        "Webhook received"
    );

    match message.notification.kind.as_str() {
        "change" => {
            participation::handle_event_change(ctx, user_id, &message.notification.changes_since)
                .await
        }
        "verification" => {
            notify(ctx.host.as_ref(), user_id, VERIFICATION_MESSAGE).await;
            Ok(StatusCode::OK)
        }
        other => Err(BridgeError::UnsupportedNotification(other.to_string())),
    }
}

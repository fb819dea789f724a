// ABOUTME: Push notification channel creation and the detached retrying subscription task
// ABOUTME: Records the outcome per user so a failed subscription is visible after the fact

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::context::AppContext;
use crate::error::BridgeResult;
use crate::metrics;
use crate::model::{SubscriptionState, SubscriptionStatus};
use crate::traits::notify;

pub const MAX_ATTEMPTS: u32 = 3;

/// Webhook URL the provider calls back for this user
pub fn callback_url(config: &Config, user_id: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("user_id", user_id)
        .append_pair("secret", &config.server.internal_secret)
        .finish();
    format!("{}?{}", config.server.webhook_url(), query)
}

/// Create a notification channel for the user; returns the provider's raw response
pub async fn create_notification_channel(ctx: &AppContext, user_id: &str) -> BridgeResult<String> {
    let credential = ctx.store.credential(user_id)?;
    let url = callback_url(&ctx.config(), user_id);
    ctx.calendar
        .create_channel(&credential.access_token, &url)
        .await
}

async fn attempt(ctx: &AppContext, user_id: &str) -> anyhow::Result<()> {
    let raw = create_notification_channel(ctx, user_id).await?;
    ctx.store
        .save_channel(&raw)
        .context("Failed to store notification channel")
}

/// Try up to MAX_ATTEMPTS times with linear backoff; DM the user on final failure
pub async fn subscribe_with_retry(ctx: &AppContext, user_id: &str) -> SubscriptionStatus {
    let mut last_error = String::new();

    for n in 1..=MAX_ATTEMPTS {
        match attempt(ctx, user_id).await {
            Ok(()) => {
                metrics::record_subscription_attempt("ok");
                tracing::info!(user_id = %user_id, attempts = n, "Subscribed to calendar notifications");
                return record(ctx, user_id, SubscriptionState::Active, None, n);
            }
            Err(e) => {
                metrics::record_subscription_attempt("failed");
                tracing::warn!(user_id = %user_id, attempt = n, error = %e, "Subscription attempt failed");
                last_error = format!("{:#}", e);
                if n < MAX_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(u64::from(n))).await;
                }
            }
        }
    }

    notify(
        ctx.host.as_ref(),
        user_id,
        &format!("Failed to subscribe to calendar notifications: {}", last_error),
    )
    .await;
    record(
        ctx,
        user_id,
        SubscriptionState::Failed,
        Some(last_error),
        MAX_ATTEMPTS,
    )
}

fn record(
    ctx: &AppContext,
    user_id: &str,
    state: SubscriptionState,
    detail: Option<String>,
    attempts: u32,
) -> SubscriptionStatus {
    let status = SubscriptionStatus {
        state,
        detail,
        attempts,
        updated_at: chrono::Utc::now().to_rfc3339(),
    };
    if let Err(e) = ctx.store.save_subscription_status(user_id, &status) {
        tracing::error!(user_id = %user_id, error = %e, "Failed to record subscription status");
    }
    status
}

pub fn spawn_subscription_task(ctx: Arc<AppContext>, user_id: String) -> JoinHandle<SubscriptionStatus> {
    tokio::spawn(async move { subscribe_with_retry(&ctx, &user_id).await })
}

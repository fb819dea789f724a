// ABOUTME: OAuth connect handshake: per-user anti-forgery state, authorize URL, code exchange.
// ABOUTME: A stored state is single use; a successful callback deletes it.

use anyhow::Context;
use std::sync::Arc;
use url::Url;

use crate::auth::{constant_time_eq, generate_state_token};
use crate::context::AppContext;
use crate::error::{BridgeError, BridgeResult};
use crate::model::{pretty_provider_name, UserCredential};
use crate::subscription;
use crate::traits::notify;

/// Separates the chat user id from the random token in the `state` parameter
pub const STATE_SEPARATOR: &str = "||";

/// Store a fresh handshake token for the user and build the provider authorize URL
pub fn begin(ctx: &AppContext, user_id: &str) -> anyhow::Result<String> {
    let config = ctx.config();
    let token = generate_state_token();
    ctx.store.save_oauth_state(user_id, &token)?;

    let authorize = format!(
        "{}/oauth/authorize",
        config.provider.app_base_url.trim_end_matches('/')
    );
    let state = format!("{}{}{}", user_id, STATE_SEPARATOR, token);
    let redirect_uri = config.server.oauth_redirect_url();
    let url = Url::parse_with_params(
        &authorize,
        &[
            ("response_type", "code"),
            ("client_id", config.provider.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", config.provider.scope.as_str()),
            ("state", state.as_str()),
        ],
    )
    .context("Failed to build authorization URL")?;

    tracing::info!(user_id = %user_id, "OAuth handshake started");
    Ok(url.into())
}

/// Split a raw `state` value into (user id, token) on the first separator
pub fn split_state(raw: &str) -> BridgeResult<(String, String)> {
    match raw.split_once(STATE_SEPARATOR) {
        Some((user_id, token)) if !user_id.is_empty() => {
            Ok((user_id.to_string(), token.to_string()))
        }
        _ => Err(BridgeError::StateMismatch),
    }
}

/// Verify the handshake state, exchange the code, and persist the credential.
///
/// The stored state is consumed before the code exchange, so of two callbacks
/// carrying the same state only one reaches the provider. A failed exchange
/// leaves the user to start over with a new `connect`. On success a background
/// task subscribes the user to change notifications.
pub async fn complete(
    ctx: &Arc<AppContext>,
    user_id: &str,
    provided_state: &str,
    code: &str,
) -> BridgeResult<UserCredential> {
    let stored = ctx
        .store
        .oauth_state(user_id)
        .map_err(BridgeError::Store)?;
    let matches = stored
        .as_deref()
        .is_some_and(|s| constant_time_eq(s.as_bytes(), provided_state.as_bytes()));
    if !matches {
        tracing::warn!(user_id = %user_id, "OAuth callback state mismatch");
        return Err(BridgeError::StateMismatch);
    }

    if code.trim().is_empty() {
        return Err(BridgeError::InvalidRequest(
            "missing authorization code".to_string(),
        ));
    }

    let consumed = ctx
        .store
        .take_oauth_state(user_id, provided_state)
        .map_err(BridgeError::Store)?;
    if !consumed {
        tracing::warn!(user_id = %user_id, "OAuth state already used by another callback");
        return Err(BridgeError::StateMismatch);
    }

    let redirect_uri = ctx.config().server.oauth_redirect_url();
    let credential = ctx.calendar.exchange_code(code, &redirect_uri).await?;

    ctx.store
        .save_credential(user_id, &credential)
        .map_err(BridgeError::Store)?;

    tracing::info!(
        user_id = %user_id,
        provider = %credential.linking_profile.provider_name,
        "Calendar account connected"
    );

    subscription::spawn_subscription_task(Arc::clone(ctx), user_id.to_string());
    Ok(credential)
}

/// Result of a browser OAuth callback, used to render the response page
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub user_id: String,
    pub provider_name: String,
    pub message: String,
}

pub fn connected_message(credential: &UserCredential) -> String {
    format!(
        r#"You've successfully connected your {} account named "{}" to your chat account."#,
        pretty_provider_name(&credential.linking_profile.provider_name),
        credential.linking_profile.profile_name
    )
}

/// Full callback flow for the `/oauth/complete` route
pub async fn handle_callback(
    ctx: &Arc<AppContext>,
    raw_state: &str,
    code: &str,
) -> BridgeResult<ConnectOutcome> {
    let (user_id, token) = split_state(raw_state)?;
    let credential = complete(ctx, &user_id, &token, code).await?;

    let message = connected_message(&credential);
    notify(ctx.host.as_ref(), &user_id, &message).await;

    Ok(ConnectOutcome {
        user_id,
        provider_name: credential.linking_profile.provider_name,
        message,
    })
}

// ABOUTME: HTTP server exposing webhook, OAuth, participation, command, and metrics routes
// ABOUTME: Routes are nested under the configured base path; errors map to BridgeError status codes

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use calbridge_core::{
    notifications, oauth, participation,
    slash::{self, CommandArgs, CommandResponse},
    AppContext, BridgeError, Config, CronofyClient, KvStore, SqliteKvStore,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::host::RelayHost;
use crate::pages::ResultPage;

/// Header the chat host sets to the authenticated user's id
pub const USER_ID_HEADER: &str = "x-chat-user-id";

#[derive(Clone)]
pub struct ServerState {
    pub ctx: Arc<AppContext>,
    pub metrics: Option<PrometheusHandle>,
}

/// Wire the standalone context: SQLite store, Cronofy client, relay host
pub fn build_context(config: Config) -> Result<Arc<AppContext>> {
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::open(&config.workspace.path)?);

    let calendar = Arc::new(CronofyClient::new(&config.provider)?);
    let host = Arc::new(RelayHost::new(Arc::clone(&kv), &config.relay)?);
    Ok(AppContext::new(config, kv, calendar, host))
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

pub fn router(state: ServerState) -> Router {
    let config = state.ctx.config();
    let prefix = config.server.route_prefix();

    let routes = Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/oauth/complete", get(oauth_complete_handler))
        .route("/oauth/complete.html", get(oauth_complete_handler))
        .route("/participation", get(participation_handler))
        .route("/command", post(command_handler));

    let app = if prefix.is_empty() {
        Router::new().merge(routes)
    } else {
        Router::new().nest(prefix, routes)
    };

    app.route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind and serve until ctrl-c
pub async fn serve(state: ServerState) -> Result<()> {
    let config = state.ctx.config();
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(
        addr = %addr,
        base_path = %config.server.base_path,
        webhook_url = %config.server.webhook_url(),
        "Starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

fn error_response(route: &str, err: &BridgeError) -> Response {
    let status = err.status_code();
    metrics::counter!(
        "calbridge_http_errors_total",
        "route" => route.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    if status.is_server_error() {
        tracing::error!(route = %route, status = status.as_u16(), error = %err, "Request failed");
    } else {
        tracing::warn!(route = %route, status = status.as_u16(), error = %err, "Request rejected");
    }
    (status, err.to_string()).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct WebhookQuery {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    secret: String,
}

async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Response {
    match notifications::handle_webhook(&state.ctx, &query.user_id, &query.secret, &body).await {
        Ok(status) => {
            tracing::debug!(user_id = %query.user_id, status = status.as_u16(), "Webhook handled");
            status.into_response()
        }
        Err(e) => error_response("webhook", &e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct OAuthQuery {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

async fn oauth_complete_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<OAuthQuery>,
) -> Response {
    match oauth::handle_callback(&state.ctx, &query.state, &query.code).await {
        Ok(outcome) => {
            tracing::info!(user_id = %outcome.user_id, provider = %outcome.provider_name, "Calendar account connected");
            let page = ResultPage::for_user(
                state.ctx.host.as_ref(),
                &outcome.user_id,
                &outcome.message,
                &outcome.provider_name,
            )
            .await;
            Html(page.to_html()).into_response()
        }
        Err(e) => error_response("oauth_complete", &e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ParticipationQuery {
    #[serde(default)]
    calendar_id: String,
    #[serde(default)]
    event_uid: String,
    #[serde(default)]
    participation: String,
}

async fn participation_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(query): Query<ParticipationQuery>,
) -> Response {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let result = participation::set_participation(
        &state.ctx,
        user_id.as_deref(),
        &query.calendar_id,
        &query.event_uid,
        &query.participation,
    )
    .await;

    let user_id = user_id.unwrap_or_default();
    match result {
        Ok(text) => {
            let page = ResultPage::for_user(state.ctx.host.as_ref(), &user_id, &text, "").await;
            Html(page.to_html()).into_response()
        }
        Err(e @ BridgeError::ParticipationRejected { .. }) => {
            tracing::error!(user_id = %user_id, error = %e, "Participation change rejected");
            let page =
                ResultPage::for_user(state.ctx.host.as_ref(), &user_id, &e.to_string(), "").await;
            (StatusCode::INTERNAL_SERVER_ERROR, Html(page.to_html())).into_response()
        }
        Err(e) => error_response("participation", &e),
    }
}

async fn command_handler(
    State(state): State<Arc<ServerState>>,
    Json(args): Json<CommandArgs>,
) -> Json<CommandResponse> {
    Json(slash::execute_command(&state.ctx, &args).await)
}

async fn metrics_handler(State(state): State<Arc<ServerState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

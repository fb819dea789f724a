// ABOUTME: Slash command handlers: view, subscribe, connect, availability
// ABOUTME: Replies are posted ephemerally through the chat host and returned to the caller

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::availability;
use crate::commands::{parse_slash_command, CommandRouter};
use crate::context::AppContext;
use crate::format::weekly_summary;
use crate::metrics;
use crate::oauth;
use crate::provider::EventsQuery;
use crate::subscription;

pub const INVALID_COMMAND: &str = "Invalid command";
pub const SUBSCRIBED_MESSAGE: &str =
    "Successfully created a subscription to update your status based on your calendar availability.";
pub const NO_CALENDARS_MESSAGE: &str = "No calendars matched the query";

/// Days covered by the `view` listing
const VIEW_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    View,
    Subscribe,
    Connect,
    Availability,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::View => "view",
            CommandKind::Subscribe => "subscribe",
            CommandKind::Connect => "connect",
            CommandKind::Availability => "availability",
        }
    }
}

/// Router with the built-in commands; anything unrecognized shows the calendar view
pub fn default_router() -> CommandRouter<CommandKind> {
    let mut router = CommandRouter::new(CommandKind::View);
    router
        .register(&["view"], CommandKind::View)
        .register(&["subscribe"], CommandKind::Subscribe)
        .register(&["connect"], CommandKind::Connect)
        .register(&["availability"], CommandKind::Availability);
    router
}

/// A slash command invocation as delivered by the chat host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandArgs {
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub text: String,
}

/// Parse, route, and run a slash command, posting the reply ephemerally
pub async fn execute_command(ctx: &Arc<AppContext>, args: &CommandArgs) -> CommandResponse {
    let trigger = ctx.config().command.trigger.clone();
    let text = match parse_slash_command(&args.command, &trigger) {
        None => INVALID_COMMAND.to_string(),
        Some(tokens) => {
            let router = default_router();
            let route = router.route(&tokens);
            let kind = *route.handler;
            metrics::record_command(kind.as_str());
            tracing::info!(
                user_id = %args.user_id,
                command = kind.as_str(),
                args = ?route.args,
                "Executing command"
            );
            run(ctx, kind, &args.user_id).await
        }
    };

    if let Err(e) = ctx
        .host
        .send_ephemeral(&args.user_id, &args.channel_id, &text)
        .await
    {
        tracing::warn!(user_id = %args.user_id, error = %e, "Failed to post command response");
    }
    CommandResponse { text }
}

async fn run(ctx: &Arc<AppContext>, kind: CommandKind, user_id: &str) -> String {
    match kind {
        CommandKind::View => execute_view(ctx, user_id).await,
        CommandKind::Subscribe => execute_subscribe(ctx, user_id).await,
        CommandKind::Connect => execute_connect(ctx, user_id),
        CommandKind::Availability => execute_availability(ctx, user_id).await,
    }
}

pub async fn execute_view(ctx: &AppContext, user_id: &str) -> String {
    let credential = match ctx.store.credential(user_id) {
        Ok(c) => c,
        Err(e) => return e.to_string(),
    };

    let calendars = match ctx.calendar.list_calendars(&credential.access_token).await {
        Ok(c) => c,
        Err(e) => return format!("Error: {}", e),
    };
    if calendars.is_empty() {
        return NO_CALENDARS_MESSAGE.to_string();
    }

    let today = Utc::now().date_naive();
    let calendar_ids = calendars.iter().map(|c| c.calendar_id.clone()).collect();
    let query = EventsQuery::window(today, today + Duration::days(VIEW_WINDOW_DAYS), calendar_ids);
    let events = match ctx
        .calendar
        .list_events(&credential.access_token, &query)
        .await
    {
        Ok(events) => events,
        Err(e) => return e.to_string(),
    };

    if let Err(e) = ctx.events.put(&events).await {
        return e.to_string();
    }

    weekly_summary(
        &ctx.config().server.participation_path(),
        &calendars,
        &events,
    )
}

pub async fn execute_subscribe(ctx: &AppContext, user_id: &str) -> String {
    let raw = match subscription::create_notification_channel(ctx, user_id).await {
        Ok(raw) => raw,
        Err(e) => return format!("Error: {}", e),
    };
    if let Err(e) = ctx.store.save_channel(&raw) {
        return format!("Error: {:#}", e);
    }
    SUBSCRIBED_MESSAGE.to_string()
}

pub fn execute_connect(ctx: &AppContext, user_id: &str) -> String {
    match oauth::begin(ctx, user_id) {
        Ok(url) => format!("#### [Click me to connect!]({})", url),
        Err(e) => format!("Failed to create OAuth state: {:#}", e),
    }
}

pub async fn execute_availability(ctx: &AppContext, user_id: &str) -> String {
    match availability::compute_and_apply(ctx, user_id).await {
        Ok(summary) => summary,
        Err(e) => format!("{:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_router_routes() {
        let router = default_router();
        let tokens = vec!["availability".to_string()];
        assert_eq!(*router.route(&tokens).handler, CommandKind::Availability);

        let tokens = vec!["subscribe".to_string(), "extra".to_string()];
        let route = router.route(&tokens);
        assert_eq!(*route.handler, CommandKind::Subscribe);
        assert_eq!(route.args, &["extra".to_string()]);

        let tokens = vec!["unknown".to_string()];
        let route = router.route(&tokens);
        assert_eq!(*route.handler, CommandKind::View);
        assert_eq!(route.args, &["unknown".to_string()]);
    }
}

// ABOUTME: Reacts to calendar change notifications and sets invitation replies with the provider.
// ABOUTME: Builds the Accept/Decline/Tentative links embedded in invitation messages.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use crate::context::AppContext;
use crate::error::{BridgeError, BridgeResult};
use crate::model::{
    parse_provider_time, CalendarEvent, ParticipationReply, ParticipationStatus,
};
use crate::provider::EventsQuery;
use crate::traits::notify;

pub const DATE_FORMAT: &str = "%A %B %d";
pub const TIME_FORMAT: &str = "%-I:%M %p";

pub const EVENT_DELETED_MESSAGE: &str = "A calendar event was deleted";
pub const PARTICIPATION_FAILED_MESSAGE: &str = "Failed to change event's status.";

pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format(DATE_FORMAT).to_string()
}

pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.format(TIME_FORMAT).to_string()
}

/// Relative link that replies to `event` with `reply`.
///
/// `participation_path` is the route as given by `ServerConfig::participation_path`.
pub fn participation_link(
    participation_path: &str,
    event: &CalendarEvent,
    reply: ParticipationReply,
) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("calendar_id", &event.calendar_id)
        .append_pair("event_uid", &event.event_uid)
        .finish();
    format!(
        "{}?{}&participation={}",
        participation_path,
        query,
        reply.as_str()
    )
}

/// `<organizer> has invited you for "<summary>"` followed by one link per reply
pub fn invitation_message(participation_path: &str, event: &CalendarEvent) -> String {
    let links: Vec<String> = ParticipationReply::ALL
        .iter()
        .map(|reply| {
            format!(
                "[{}]({})",
                reply.label(),
                participation_link(participation_path, event, *reply)
            )
        })
        .collect();
    format!(
        r#"{} has invited you for "{}" {}"#,
        event.organizer.email,
        event.summary,
        links.join(" ")
    )
}

// =============================================================================
// Change handler
// =============================================================================

/// Handle a `change` notification for `user_id`
pub async fn handle_event_change(
    ctx: &AppContext,
    user_id: &str,
    changes_since: &str,
) -> BridgeResult<StatusCode> {
    let credential = ctx.store.credential(user_id)?;

    let since = match parse_provider_time(changes_since) {
        Ok(ts) => ts,
        Err(e) => {
            let msg = format!("parsing time {:?}: {}", changes_since, e);
            notify(ctx.host.as_ref(), user_id, &msg).await;
            return Err(BridgeError::InvalidTimestamp(msg));
        }
    };

    let events = match ctx
        .calendar
        .list_events(&credential.access_token, &EventsQuery::modified_since(since))
        .await
    {
        Ok(events) => events,
        Err(e) => {
            notify(ctx.host.as_ref(), user_id, &e.to_string()).await;
            return Err(e);
        }
    };

    let Some(first) = events.first() else {
        notify(ctx.host.as_ref(), user_id, EVENT_DELETED_MESSAGE).await;
        return Ok(StatusCode::OK);
    };

    ctx.events.put(&events).await?;

    if events.len() > 1 {
        tracing::info!(
            user_id = %user_id,
            skipped = events.len() - 1,
            "Change notification returned several events; only the first is reported"
        );
    }

    let text = if first.participation_status == ParticipationStatus::NeedsAction {
        invitation_message(&ctx.config().server.participation_path(), first)
    } else {
        format!(
            r#"Event "{}" has changed. You have already replied: {}"#,
            first.summary, first.participation_status
        )
    };
    notify(ctx.host.as_ref(), user_id, &text).await;
    Ok(StatusCode::OK)
}

// =============================================================================
// Participation status setter
// =============================================================================

/// Reply to an invitation on the user's behalf; returns the confirmation text
pub async fn set_participation(
    ctx: &AppContext,
    user_id: Option<&str>,
    calendar_id: &str,
    event_uid: &str,
    participation: &str,
) -> BridgeResult<String> {
    let user_id = user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BridgeError::Unauthorized("not authorized".to_string()))?;

    let reply = participation
        .parse::<ParticipationReply>()
        .map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;
    if calendar_id.is_empty() || event_uid.is_empty() {
        return Err(BridgeError::InvalidRequest(
            "calendar_id and event_uid are required".to_string(),
        ));
    }

    let credential = ctx.store.credential(user_id)?;

    let status = match ctx
        .calendar
        .set_participation(&credential.access_token, calendar_id, event_uid, reply)
        .await
    {
        Ok(status) => status,
        Err(e) => {
            notify(ctx.host.as_ref(), user_id, &e.to_string()).await;
            0
        }
    };

    if status != StatusCode::ACCEPTED.as_u16() {
        tracing::warn!(
            user_id = %user_id,
            event_uid = %event_uid,
            status,
            "Provider rejected participation change"
        );
        notify(ctx.host.as_ref(), user_id, PARTICIPATION_FAILED_MESSAGE).await;
        return Err(BridgeError::ParticipationRejected { status });
    }

    let text = match ctx.events.get(event_uid) {
        Ok(event) => match event.start_time() {
            Some(start) => format!(
                r#"Successfully set status to {}, for "{}" with {} on {} at {}"#,
                reply,
                event.summary,
                event.organizer.email,
                format_date(start),
                format_time(start)
            ),
            None => format!("Successfully set status to {}", reply),
        },
        Err(e) => {
            tracing::debug!(event_uid = %event_uid, error = %e, "Event not cached");
            format!("Successfully set status to {}", reply)
        }
    };

    notify(ctx.host.as_ref(), user_id, &text).await;
    Ok(text)
}

// ABOUTME: Availability engine: asks the provider whether the user is free soon and flips presence.
// ABOUTME: Only two transitions exist: to dnd when busy, back to online when free again.

use chrono::{DateTime, Duration, Utc};

use crate::context::AppContext;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::model::{
    format_provider_time, AvailabilityBuffer, AvailabilityDuration, AvailabilityMember,
    AvailabilityParticipant, AvailabilityPeriod, AvailabilityRequest, AvailabilityResponse,
    PresenceStatus,
};

/// Look-ahead window starts this many minutes from now
pub const WINDOW_START_MINUTES: i64 = 2;
pub const WINDOW_END_MINUTES: i64 = 15;
pub const REQUIRED_DURATION_MINUTES: i64 = 2;
pub const BUFFER_BEFORE_MINUTES: i64 = 6;
pub const BUFFER_AFTER_MINUTES: i64 = 5;

pub fn build_availability_request(
    sub: &str,
    calendar_ids: Vec<String>,
    now: DateTime<Utc>,
) -> AvailabilityRequest {
    AvailabilityRequest {
        participants: vec![AvailabilityParticipant {
            members: vec![AvailabilityMember {
                sub: sub.to_string(),
                calendar_ids,
            }],
            required: "all".to_string(),
        }],
        required_duration: AvailabilityDuration {
            minutes: REQUIRED_DURATION_MINUTES,
        },
        available_periods: vec![AvailabilityPeriod {
            start: format_provider_time(now + Duration::minutes(WINDOW_START_MINUTES)),
            end: format_provider_time(now + Duration::minutes(WINDOW_END_MINUTES)),
        }],
        buffer: AvailabilityBuffer {
            before: AvailabilityDuration {
                minutes: BUFFER_BEFORE_MINUTES,
            },
            after: AvailabilityDuration {
                minutes: BUFFER_AFTER_MINUTES,
            },
        },
    }
}

/// Query the provider for the user's free periods in the look-ahead window
pub async fn fetch_availability(ctx: &AppContext, user_id: &str) -> BridgeResult<AvailabilityResponse> {
    let credential = ctx.store.credential(user_id)?;
    let calendars = ctx.calendar.list_calendars(&credential.access_token).await?;
    if calendars.is_empty() {
        return Err(BridgeError::NoCalendars);
    }

    let calendar_ids = calendars.into_iter().map(|c| c.calendar_id).collect();
    let request = build_availability_request(&credential.sub, calendar_ids, Utc::now());
    ctx.calendar
        .availability(&credential.access_token, &request)
        .await
}

/// Apply the presence transition implied by an availability result
pub async fn apply_availability(
    ctx: &AppContext,
    user_id: &str,
    availability: &AvailabilityResponse,
) -> BridgeResult<String> {
    let previous = ctx
        .host
        .get_user_status(user_id)
        .await
        .map_err(BridgeError::Host)?;
    let free = !availability.available_periods.is_empty();

    let summary = match (free, previous.is_dnd()) {
        (false, true) => "User is not available. User is already DND.".to_string(),
        (false, false) => {
            let next = ctx
                .host
                .update_user_status(user_id, PresenceStatus::Dnd)
                .await
                .map_err(BridgeError::Host)?;
            metrics::record_presence_change(next.as_str());
            tracing::info!(user_id = %user_id, old = %previous, new = %next, "Presence set to busy");
            format!(
                r#"User is not available. Old status "{}", New status "{}""#,
                previous, next
            )
        }
        (true, false) => format!("User is available. Status is still {}", previous),
        (true, true) => {
            let next = ctx
                .host
                .update_user_status(user_id, PresenceStatus::Online)
                .await
                .map_err(BridgeError::Host)?;
            metrics::record_presence_change(next.as_str());
            tracing::info!(user_id = %user_id, old = %previous, new = %next, "Presence restored");
            format!(
                r#"User is available. Old status "{}", New status "{}""#,
                previous, next
            )
        }
    };
    Ok(summary)
}

/// Fetch availability and update presence; returns a one-line summary
pub async fn compute_and_apply(ctx: &AppContext, user_id: &str) -> anyhow::Result<String> {
    let availability = match fetch_availability(ctx, user_id).await {
        Ok(a) => a,
        Err(e) => {
            metrics::record_availability_run("fetch_failed");
            return Err(anyhow::Error::new(e).context("Failed to fetch user availabilities"));
        }
    };

    match apply_availability(ctx, user_id, &availability).await {
        Ok(summary) => {
            metrics::record_availability_run("ok");
            Ok(summary)
        }
        Err(e) => {
            metrics::record_availability_run("update_failed");
            Err(anyhow::Error::new(e).context("Failed to update user status based on availabilities"))
        }
    }
}

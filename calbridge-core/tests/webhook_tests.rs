// ABOUTME: Tests for webhook ingestion and the change handler
// ABOUTME: Covers authentication, decode failures, dispatch by type, and event store effects

use calbridge_core::kv::KvStore;
use calbridge_core::model::{CalendarEvent, Organizer, ParticipationStatus, UserCredential};
use calbridge_core::notifications::{handle_webhook, VERIFICATION_MESSAGE};
use calbridge_core::store::CALENDAR_EVENTS_KEY;
use calbridge_core::testing::{test_config, test_context, MockCalendar, MockHost};
use calbridge_core::{AppContext, BridgeError};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;

const SECRET: &str = "internal-secret";

struct Harness {
    ctx: Arc<AppContext>,
    host: Arc<MockHost>,
    calendar: Arc<MockCalendar>,
}

fn harness() -> Harness {
    let host = Arc::new(MockHost::new());
    let calendar = Arc::new(MockCalendar::new());
    let ctx = test_context(test_config(), calendar.clone(), host.clone());
    Harness {
        ctx,
        host,
        calendar,
    }
}

fn connect(ctx: &AppContext, user_id: &str) {
    ctx.store
        .save_credential(
            user_id,
            &UserCredential {
                access_token: "tok".to_string(),
                sub: "acc_sub".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
}

fn body(kind: &str, changes_since: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "notification": {"type": kind, "changes_since": changes_since},
        "channel": {
            "channel_id": "chn_1",
            "callback_url": "https://chat.example.com/plugins/cronofy/webhook",
            "filters": {}
        }
    }))
    .unwrap()
}

fn event(uid: &str, summary: &str, status: ParticipationStatus) -> CalendarEvent {
    CalendarEvent {
        calendar_id: "cal_1".to_string(),
        event_uid: uid.to_string(),
        summary: summary.to_string(),
        start: "2023-01-02T09:00:00Z".to_string(),
        end: "2023-01-02T09:15:00Z".to_string(),
        organizer: Organizer {
            email: "a@b.com".to_string(),
            display_name: None,
        },
        participation_status: status,
        ..Default::default()
    }
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_user_id_is_unauthorized() {
    let h = harness();
    let err = handle_webhook(&h.ctx, "", SECRET, &body("verification", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unauthorized(_)));
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    assert!(h.host.dms().is_empty());
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized_before_parsing() {
    let h = harness();
    let err = handle_webhook(&h.ctx, "u1", "wrong", b"not json at all")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unauthorized(_)));
    assert!(h.host.dms().is_empty(), "No DM for unauthorized requests");
}

#[tokio::test]
async fn test_empty_configured_secret_rejects_everything() {
    let host = Arc::new(MockHost::new());
    let calendar = Arc::new(MockCalendar::new());
    let mut config = test_config();
    config.server.internal_secret = String::new();
    let ctx = test_context(config, calendar, host.clone());

    let err = handle_webhook(&ctx, "u1", "", &body("verification", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unauthorized(_)));
    assert!(host.dms().is_empty());
}

// =============================================================================
// Decoding and dispatch
// =============================================================================

#[tokio::test]
async fn test_decode_failure_dms_user_and_fails() {
    let h = harness();
    let err = handle_webhook(&h.ctx, "u1", SECRET, b"{not json")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidPayload(_)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let dms = h.host.dms_for("u1");
    assert_eq!(dms.len(), 1);
    assert_eq!(dms[0], err.to_string());
}

#[tokio::test]
async fn test_verification_sends_welcome() {
    let h = harness();
    let status = handle_webhook(&h.ctx, "u1", SECRET, &body("verification", ""))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.host.dms_for("u1"), vec![VERIFICATION_MESSAGE.to_string()]);
}

#[tokio::test]
async fn test_unsupported_type_is_not_found() {
    let h = harness();
    let err = handle_webhook(&h.ctx, "u1", SECRET, &body("bogus", ""))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(err.to_string(), "Unsupported webhook message type: bogus");
    assert!(h.host.dms().is_empty());
}

// =============================================================================
// Change handler
// =============================================================================

#[tokio::test]
async fn test_change_without_credential_fails_silently() {
    let h = harness();
    let err = handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected(_)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.host.dms().is_empty());
}

#[tokio::test]
async fn test_change_with_bad_timestamp_dms_parse_error() {
    let h = harness();
    connect(&h.ctx, "u1");
    let err = handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01 00:00"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidTimestamp(_)));
    assert_eq!(h.host.dms_for("u1").len(), 1);
    assert!(h.calendar.event_queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_change_provider_failure_is_relayed() {
    let h = harness();
    connect(&h.ctx, "u1");
    h.calendar.fail_events("provider down");
    let err = handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Upstream(_)));
    assert_eq!(h.host.dms_for("u1"), vec!["provider down".to_string()]);
}

#[tokio::test]
async fn test_zero_events_reports_deletion_without_store_write() {
    let h = harness();
    connect(&h.ctx, "u1");

    let status = handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        h.host.dms_for("u1"),
        vec!["A calendar event was deleted".to_string()]
    );
    assert!(h.ctx.store.kv().get(CALENDAR_EVENTS_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_change_queries_modified_since_timestamp() {
    let h = harness();
    connect(&h.ctx, "u1");
    handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap();

    let queries = h.calendar.event_queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(
        queries[0].last_modified.unwrap().to_rfc3339(),
        "2023-01-01T00:00:00+00:00"
    );
    assert!(queries[0].calendar_ids.is_empty());
}

#[tokio::test]
async fn test_already_replied_event() {
    let h = harness();
    connect(&h.ctx, "u1");
    h.calendar
        .set_events(vec![event("evt_1", "Planning", ParticipationStatus::Accepted)]);

    handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap();

    let dms = h.host.dms_for("u1");
    assert_eq!(dms.len(), 1);
    assert_eq!(
        dms[0],
        r#"Event "Planning" has changed. You have already replied: accepted"#
    );
}

#[tokio::test]
async fn test_needs_action_event_sends_invitation_links() {
    let h = harness();
    connect(&h.ctx, "u1");
    h.calendar
        .set_events(vec![event("evt_1", "Standup", ParticipationStatus::NeedsAction)]);

    let status = handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let dms = h.host.dms_for("u1");
    assert_eq!(dms.len(), 1);
    let dm = &dms[0];
    assert!(dm.contains(r#"a@b.com has invited you for "Standup""#));
    assert!(dm.contains(
        "[Accept](/plugins/cronofy/participation?calendar_id=cal_1&event_uid=evt_1&participation=accepted)"
    ));
    assert!(dm.contains("participation=declined"));
    assert!(dm.contains("participation=tentative"));
}

#[tokio::test]
async fn test_only_first_event_is_reported_but_all_are_stored() {
    let h = harness();
    connect(&h.ctx, "u1");
    h.calendar.set_events(vec![
        event("evt_1", "First", ParticipationStatus::Declined),
        event("evt_2", "Second", ParticipationStatus::NeedsAction),
        event("evt_3", "Third", ParticipationStatus::Tentative),
    ]);

    handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap();

    let dms = h.host.dms_for("u1");
    assert_eq!(dms.len(), 1);
    assert!(dms[0].contains("First"));

    let stored = h.ctx.events.get_all().unwrap();
    assert_eq!(stored.len(), 3);
    for uid in ["evt_1", "evt_2", "evt_3"] {
        assert_eq!(stored[uid].event_uid, uid);
    }
}

#[tokio::test]
async fn test_replaying_change_is_idempotent_for_store() {
    let h = harness();
    connect(&h.ctx, "u1");
    h.calendar.set_events(vec![
        event("evt_1", "First", ParticipationStatus::Accepted),
        event("evt_2", "Second", ParticipationStatus::Accepted),
    ]);

    handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap();
    let first = h.ctx.events.get_all().unwrap();

    handle_webhook(&h.ctx, "u1", SECRET, &body("change", "2023-01-01T00:00:00Z"))
        .await
        .unwrap();
    let second = h.ctx.events.get_all().unwrap();

    assert_eq!(first, second);
}

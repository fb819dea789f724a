// ABOUTME: Tests for replying to invitations through the participation setter
// ABOUTME: Validation, provider rejection, and confirmation text with and without cached events

use calbridge_core::model::{
    CalendarEvent, Organizer, ParticipationReply, ParticipationStatus, UserCredential,
};
use calbridge_core::participation::{set_participation, PARTICIPATION_FAILED_MESSAGE};
use calbridge_core::testing::{test_config, test_context, MockCalendar, MockHost};
use calbridge_core::{AppContext, BridgeError};
use reqwest::StatusCode;
use std::sync::Arc;

fn setup() -> (Arc<AppContext>, Arc<MockHost>, Arc<MockCalendar>) {
    let host = Arc::new(MockHost::new());
    let calendar = Arc::new(MockCalendar::new());
    let ctx = test_context(test_config(), calendar.clone(), host.clone());
    ctx.store
        .save_credential(
            "u1",
            &UserCredential {
                access_token: "tok".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    (ctx, host, calendar)
}

#[tokio::test]
async fn test_missing_user_is_unauthorized() {
    let (ctx, host, _) = setup();
    let err = set_participation(&ctx, None, "cal_1", "evt_1", "accepted")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

    let err = set_participation(&ctx, Some(""), "cal_1", "evt_1", "accepted")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    assert!(host.dms().is_empty());
}

#[tokio::test]
async fn test_unknown_participation_is_bad_request() {
    let (ctx, _, calendar) = setup();
    let err = set_participation(&ctx, Some("u1"), "cal_1", "evt_1", "maybe")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidRequest(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert!(calendar.participation_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_not_connected_user() {
    let (ctx, _, _) = setup();
    let err = set_participation(&ctx, Some("u2"), "cal_1", "evt_1", "accepted")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected(_)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_provider_rejection_notifies_user() {
    let (ctx, host, calendar) = setup();
    calendar.set_participation_status(404);

    let err = set_participation(&ctx, Some("u1"), "cal_1", "evt_1", "declined")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::ParticipationRejected { status: 404 }
    ));
    assert_eq!(err.to_string(), PARTICIPATION_FAILED_MESSAGE);
    assert_eq!(
        host.dms_for("u1"),
        vec![PARTICIPATION_FAILED_MESSAGE.to_string()]
    );
}

#[tokio::test]
async fn test_success_without_cached_event() {
    let (ctx, host, calendar) = setup();
    let text = set_participation(&ctx, Some("u1"), "cal_1", "evt_1", "tentative")
        .await
        .unwrap();
    assert_eq!(text, "Successfully set status to tentative");
    assert_eq!(host.dms_for("u1"), vec![text]);
    assert_eq!(
        calendar.participation_calls.lock().unwrap().clone(),
        vec![(
            "cal_1".to_string(),
            "evt_1".to_string(),
            ParticipationReply::Tentative
        )]
    );
}

#[tokio::test]
async fn test_success_with_cached_event_includes_details() {
    let (ctx, host, _) = setup();
    ctx.events
        .put(&[CalendarEvent {
            calendar_id: "cal_1".to_string(),
            event_uid: "evt_1".to_string(),
            summary: "Standup".to_string(),
            start: "2024-01-08T15:04:00Z".to_string(),
            end: "2024-01-08T15:30:00Z".to_string(),
            organizer: Organizer {
                email: "a@b.com".to_string(),
                display_name: None,
            },
            participation_status: ParticipationStatus::NeedsAction,
            ..Default::default()
        }])
        .await
        .unwrap();

    let text = set_participation(&ctx, Some("u1"), "cal_1", "evt_1", "accepted")
        .await
        .unwrap();
    assert_eq!(
        text,
        r#"Successfully set status to accepted, for "Standup" with a@b.com on Monday January 08 at 3:04 PM"#
    );
    assert_eq!(host.dms_for("u1").len(), 1);
}

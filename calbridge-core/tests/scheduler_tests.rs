// ABOUTME: Tests for the recurring availability job lifecycle under paused tokio time
// ABOUTME: Covers first-tick delay, start/stop idempotence, and reconfiguration

use calbridge_core::kv::KvStore;
use calbridge_core::model::{Calendar, UserCredential};
use calbridge_core::scheduler::{run_once, RecurringJob};
use calbridge_core::testing::{test_config, test_context, MockCalendar, MockHost};
use calbridge_core::{AppContext, Config};
use std::sync::Arc;
use std::time::Duration;

fn job_config() -> Config {
    let mut config = test_config();
    config.availability_job.enabled = true;
    config.availability_job.username = "alice".to_string();
    config.availability_job.interval_secs = 20;
    config
}

fn setup(config: Config) -> (Arc<AppContext>, Arc<MockHost>) {
    let host = Arc::new(MockHost::new().with_user("alice", "u1"));
    let calendar = Arc::new(MockCalendar::new());
    calendar.set_calendars(vec![Calendar {
        calendar_id: "cal_1".to_string(),
        ..Default::default()
    }]);
    calendar.set_available(true);
    let ctx = test_context(config, calendar, host.clone());
    ctx.store
        .save_credential(
            "u1",
            &UserCredential {
                access_token: "tok".to_string(),
                sub: "acc_sub".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    (ctx, host)
}

#[tokio::test(start_paused = true)]
async fn test_first_run_happens_after_one_interval() {
    let (ctx, host) = setup(job_config());
    ctx.init_recurring_job(true).await;
    assert!(ctx.job_running().await);

    tokio::time::sleep(Duration::from_secs(19)).await;
    assert!(host.dms().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        host.dms_for("u1"),
        vec![
            "Running availability job".to_string(),
            "Successfully ran availability job. User is available. Status is still online"
                .to_string(),
        ]
    );

    ctx.shutdown().await;
    assert!(!ctx.job_running().await);
}

#[tokio::test(start_paused = true)]
async fn test_runs_repeat_each_interval() {
    let (ctx, host) = setup(job_config());
    ctx.init_recurring_job(true).await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(host.dms_for("u1").len(), 6);
    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_enable_restarts_a_loop_that_died() {
    let (ctx, host) = setup(job_config());
    host.panic_on_user_lookup(true);
    ctx.init_recurring_job(true).await;

    tokio::time::sleep(Duration::from_secs(21)).await;
    assert!(!ctx.job_running().await);
    assert!(host.dms().is_empty());

    host.panic_on_user_lookup(false);
    ctx.init_recurring_job(true).await;
    assert!(ctx.job_running().await);

    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(host.dms_for("u1").len(), 2);
    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_enable_twice_starts_one_loop() {
    let (ctx, host) = setup(job_config());
    ctx.init_recurring_job(true).await;
    ctx.init_recurring_job(true).await;

    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(host.dms_for("u1").len(), 2);
    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disable_stops_further_runs() {
    let (ctx, host) = setup(job_config());
    ctx.init_recurring_job(true).await;
    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(host.dms_for("u1").len(), 2);

    ctx.init_recurring_job(false).await;
    assert!(!ctx.job_running().await);
    ctx.init_recurring_job(false).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(host.dms_for("u1").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let (ctx, _) = setup(job_config());
    let mut job = RecurringJob::start(&ctx, Duration::from_secs(20));
    assert!(job.is_running());
    job.cancel().await;
    assert!(!job.is_running());
    job.cancel().await;
    assert!(!job.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_user_skips_run() {
    let mut config = job_config();
    config.availability_job.username = "nobody".to_string();
    let (ctx, host) = setup(config);

    run_once(&ctx).await;
    assert!(host.dms().is_empty());
    assert!(host.status_updates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_reports_error() {
    let (ctx, host) = setup(job_config());
    ctx.store.kv().delete("user_u1").unwrap();

    run_once(&ctx).await;
    let dms = host.dms_for("u1");
    assert_eq!(dms.len(), 2);
    assert_eq!(dms[0], "Running availability job");
    assert_eq!(
        dms[1],
        "Failed to run availability job. Failed to fetch user availabilities: no calendar account connected for user u1"
    );
}

#[tokio::test(start_paused = true)]
async fn test_set_config_disables_job() {
    let (ctx, host) = setup(job_config());
    ctx.init_recurring_job(true).await;

    let mut config = job_config();
    config.availability_job.enabled = false;
    ctx.set_config(config).await.unwrap();
    assert!(!ctx.job_running().await);
    assert!(!ctx.config().availability_job.enabled);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(host.dms().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_set_config_enables_job() {
    let mut config = job_config();
    config.availability_job.enabled = false;
    let (ctx, host) = setup(config);
    ctx.init_recurring_job(ctx.config().availability_job.enabled).await;
    assert!(!ctx.job_running().await);

    ctx.set_config(job_config()).await.unwrap();
    assert!(ctx.job_running().await);

    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(host.dms_for("u1").len(), 2);
    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_set_config_restarts_on_interval_change() {
    let (ctx, host) = setup(job_config());
    ctx.init_recurring_job(true).await;

    let mut config = job_config();
    config.availability_job.interval_secs = 5;
    ctx.set_config(config).await.unwrap();
    assert!(ctx.job_running().await);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(host.dms_for("u1").len(), 2);
    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_is_rejected_and_job_untouched() {
    let (ctx, _) = setup(job_config());
    ctx.init_recurring_job(true).await;

    let mut config = job_config();
    config.availability_job.interval_secs = 0;
    assert!(ctx.set_config(config).await.is_err());
    assert_eq!(ctx.config().availability_job.interval_secs, 20);
    assert!(ctx.job_running().await);
    ctx.shutdown().await;
}

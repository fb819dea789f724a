// ABOUTME: Recurring availability job: ticks on a fixed interval and syncs one user's presence.
// ABOUTME: Cancellation is cooperative; cancel() waits for the loop task to exit.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::availability;
use crate::context::AppContext;
use crate::traits::notify;

/// Handle to the running availability loop
pub struct RecurringJob {
    cancellation: CancellationToken,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl RecurringJob {
    /// Spawn the loop. The first run happens one full interval after start.
    pub fn start(ctx: &Arc<AppContext>, interval: Duration) -> Self {
        let cancellation = CancellationToken::new();
        let token = cancellation.clone();
        let weak = Arc::downgrade(ctx);

        tracing::info!(
            interval_secs = interval.as_secs(),
            "Starting availability job"
        );
        let handle = tokio::spawn(async move {
            run_loop(weak, interval, token).await;
        });

        Self {
            cancellation,
            handle: Some(handle),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit. Safe to call more than once.
    pub async fn cancel(&mut self) {
        self.cancellation.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Availability job task ended abnormally");
            }
            tracing::info!("Availability job stopped");
        }
    }
}

impl Drop for RecurringJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::warn!("RecurringJob dropped while running; cancelling");
            self.cancellation.cancel();
        }
    }
}

async fn run_loop(ctx: Weak<AppContext>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // The context owns this job; once it is gone there is nothing left to sync.
        let Some(ctx) = ctx.upgrade() else {
            break;
        };
        run_once(&ctx).await;
    }

    tracing::debug!("Availability job loop exited");
}

/// One job run: resolve the configured user, then sync and report by DM
pub async fn run_once(ctx: &AppContext) {
    let username = ctx.config().availability_job.username.clone();

    let user_id = match ctx.host.find_user_id(&username).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            tracing::warn!(username = %username, "Availability job user not found; skipping run");
            return;
        }
        Err(e) => {
            tracing::warn!(username = %username, error = %e, "Failed to look up availability job user");
            return;
        }
    };

    notify(ctx.host.as_ref(), &user_id, "Running availability job").await;

    match availability::compute_and_apply(ctx, &user_id).await {
        Ok(summary) => {
            notify(
                ctx.host.as_ref(),
                &user_id,
                &format!("Successfully ran availability job. {}", summary),
            )
            .await;
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Availability job run failed");
            notify(
                ctx.host.as_ref(),
                &user_id,
                &format!("Failed to run availability job. {:#}", e),
            )
            .await;
        }
    }
}

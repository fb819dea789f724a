// ABOUTME: Shared application state passed to every handler, command, and background task
// ABOUTME: Owns configuration, stores, collaborators, and the single recurring job slot

use anyhow::Result;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::event_store::EventStore;
use crate::kv::KvStore;
use crate::provider::CalendarApi;
use crate::scheduler::RecurringJob;
use crate::store::BridgeStore;
use crate::traits::ChatHost;

pub struct AppContext {
    config: RwLock<Arc<Config>>,
    pub store: BridgeStore,
    pub events: EventStore,
    pub calendar: Arc<dyn CalendarApi>,
    pub host: Arc<dyn ChatHost>,
    job: Mutex<Option<RecurringJob>>,
}

impl AppContext {
    pub fn new(
        config: Config,
        kv: Arc<dyn KvStore>,
        calendar: Arc<dyn CalendarApi>,
        host: Arc<dyn ChatHost>,
    ) -> Arc<Self> {
        let store = BridgeStore::new(kv);
        Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            events: EventStore::new(store.clone()),
            store,
            calendar,
            host,
            job: Mutex::new(None),
        })
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Arc<Config> {
        let guard = self.config.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the configuration and reconcile the job with it.
    ///
    /// Holds the job lock for the whole swap so job start/stop never races a
    /// configuration change.
    pub async fn set_config(self: &Arc<Self>, config: Config) -> Result<()> {
        config.validate()?;

        let mut job = self.job.lock().await;
        let enabled = config.availability_job.enabled;
        let interval = config.availability_job.interval();
        {
            let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::new(config);
        }

        // A running job keeps its interval; restart it when the interval changed
        if let Some(current) = job.as_mut() {
            if enabled && current.interval() != interval {
                current.cancel().await;
                *job = None;
            }
        }
        self.apply_job_state(&mut job, enabled).await;
        tracing::info!(job_enabled = enabled, "Configuration updated");
        Ok(())
    }

    /// Start or stop the recurring job. Enabling a running job and disabling a
    /// stopped one are no-ops.
    pub async fn init_recurring_job(self: &Arc<Self>, enable: bool) {
        let mut job = self.job.lock().await;
        self.apply_job_state(&mut job, enable).await;
    }

    async fn apply_job_state(self: &Arc<Self>, job: &mut Option<RecurringJob>, enable: bool) {
        let running = job.as_ref().is_some_and(RecurringJob::is_running);
        match (enable, running) {
            (true, false) => {
                // A loop that exited on its own leaves a finished handle behind
                if let Some(mut stale) = job.take() {
                    tracing::warn!("Availability job loop had exited; restarting");
                    stale.cancel().await;
                }
                let interval = self.config().availability_job.interval();
                *job = Some(RecurringJob::start(self, interval));
            }
            (false, _) => {
                if let Some(mut current) = job.take() {
                    current.cancel().await;
                }
            }
            _ => {}
        }
    }

    pub async fn job_running(&self) -> bool {
        self.job
            .lock()
            .await
            .as_ref()
            .is_some_and(RecurringJob::is_running)
    }

    /// Stop background work before the process exits
    pub async fn shutdown(&self) {
        if let Some(mut running) = self.job.lock().await.take() {
            running.cancel().await;
        }
    }
}

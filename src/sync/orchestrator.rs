//! Recurring sync schedule.
//!
//! At most one schedule exists per orchestrator. Starting replaces any
//! previous schedule, logs in, runs one cycle immediately and then arms a
//! repeating task. The in-memory schedule is the source of truth for
//! "running"; the persisted flag is corrected to match whenever it is read.
//!
//! Start and stop run on their own task, so a caller that goes away (a
//! dropped HTTP request) cannot leave a half-finished transition behind.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{step, Credentials, SyncBackend, SyncResult};
use crate::error::{Result, SyncError};
use crate::store::{Store, SyncPeriod};

const RESULT_CHANNEL_CAPACITY: usize = 256;

/// Runs cycles and publishes their results. Shared with the schedule task.
struct Cycle {
    backend: Arc<dyn SyncBackend>,
    store: Store,
    results: broadcast::Sender<SyncResult>,
    in_flight: tokio::sync::Mutex<()>,
}

impl Cycle {
    fn emit(&self, result: SyncResult) {
        if result.success {
            log::info!(
                "[sync] {}: {}",
                result.api,
                result.message.as_deref().unwrap_or("ok")
            );
        } else {
            log::warn!(
                "[sync] {}: {}",
                result.api,
                result.error.as_deref().unwrap_or("failed")
            );
        }
        // No listeners is fine.
        let _ = self.results.send(result);
    }

    /// Run a cycle, waiting for any cycle already in flight.
    async fn run(&self) {
        let _guard = self.in_flight.lock().await;
        self.execute().await;
    }

    /// Run a cycle unless one is already in flight.
    async fn try_run(&self) -> bool {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return false;
        };
        self.execute().await;
        true
    }

    async fn execute(&self) {
        for result in self.backend.run_sync_sequence().await {
            self.emit(result);
        }
        if let Err(e) = self.store.touch_last_sync() {
            log::warn!("[sync] Could not record last sync time: {}", e);
        }
    }
}

struct Schedule {
    period: SyncPeriod,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// State that outlives any single start/stop call.
struct Shared {
    store: Store,
    cycle: Arc<Cycle>,
    schedule: Mutex<Option<Schedule>>,
    /// Serializes start/stop so a stop cannot interleave with a start.
    lifecycle: tokio::sync::Mutex<()>,
}

impl Shared {
    fn lock_schedule(&self) -> MutexGuard<'_, Option<Schedule>> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn start(&self, period: SyncPeriod, credentials: Credentials) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        // Stop ticking now; the slot keeps the old entry until the new
        // schedule replaces it.
        if let Some(previous) = self.lock_schedule().as_ref() {
            log::info!(
                "[sync] Cancelling previous {} minute schedule",
                previous.period.minutes()
            );
            previous.cancel.cancel();
        }

        let prepared = self
            .store
            .save_sync_period(period)
            .and_then(|_| self.store.mark_running(true));
        if let Err(e) = prepared {
            self.lock_schedule().take();
            return Err(e);
        }

        if let Err(e) = self
            .cycle
            .backend
            .login(&credentials.username, &credentials.password)
            .await
        {
            log::error!("[sync] Login failed, sync not started: {}", e);
            self.lock_schedule().take();
            self.cycle
                .emit(SyncResult::failure(step::LOGIN, Utc::now(), &e));
            if let Err(store_err) = self.store.mark_running(false) {
                log::error!("[sync] Could not clear running flag: {}", store_err);
            }
            return Err(e);
        }
        self.cycle.emit(
            SyncResult::success(step::LOGIN, Utc::now()).with_message("Authentication successful"),
        );

        self.cycle.run().await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_schedule(
            Arc::clone(&self.cycle),
            period.interval(),
            cancel.clone(),
        ));
        *self.lock_schedule() = Some(Schedule {
            period,
            cancel,
            handle,
        });
        log::info!("[sync] Sync scheduled every {} minutes", period.minutes());
        Ok(())
    }

    async fn stop(&self) -> Result<&'static str> {
        let _lifecycle = self.lifecycle.lock().await;

        let Some(schedule) = self.lock_schedule().take() else {
            return Err(SyncError::NoOp("No active sync to stop".to_string()));
        };
        schedule.cancel.cancel();
        self.store.mark_running(false)?;

        self.cycle
            .emit(SyncResult::success(step::SYSTEM, Utc::now()).with_message("Sync stopped"));
        Ok("Sync stopped")
    }
}

/// Await a lifecycle task, surfacing its panic if it had one.
async fn join<T>(task: JoinHandle<Result<T>>) -> Result<T> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(SyncError::NoOp(format!("Sync task was cancelled: {}", e))),
    }
}

/// Drives recurring sync cycles against a [`SyncBackend`].
pub struct SyncOrchestrator {
    shared: Arc<Shared>,
}

impl SyncOrchestrator {
    pub fn new(store: Store, backend: Arc<dyn SyncBackend>) -> Self {
        let (results, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                store: store.clone(),
                cycle: Arc::new(Cycle {
                    backend,
                    store,
                    results,
                    in_flight: tokio::sync::Mutex::new(()),
                }),
                schedule: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Receive every result emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncResult> {
        self.shared.cycle.results.subscribe()
    }

    /// Period of the active schedule, if any.
    pub fn active_period(&self) -> Option<SyncPeriod> {
        self.shared
            .lock_schedule()
            .as_ref()
            .filter(|s| !s.cancel.is_cancelled())
            .map(|s| s.period)
    }

    /// Start syncing every `period`.
    ///
    /// On login failure a `Login` failure result is emitted, the persisted
    /// flag is reset to not running and nothing is scheduled. Otherwise one
    /// cycle runs before this returns and the schedule is armed. Dropping the
    /// returned future does not interrupt the start.
    pub async fn start_sync(&self, period: SyncPeriod, credentials: &Credentials) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let credentials = credentials.clone();
        join(tokio::spawn(async move {
            shared.start(period, credentials).await
        }))
        .await
    }

    /// Cancel the schedule. A cycle already running is left to finish.
    pub async fn stop_sync(&self) -> Result<&'static str> {
        let shared = Arc::clone(&self.shared);
        join(tokio::spawn(async move { shared.stop().await })).await
    }

    /// Whether a schedule is active in this process. A persisted flag that
    /// disagrees is overwritten.
    pub fn is_running(&self) -> bool {
        let shared = &self.shared;
        // Mid start/stop the persisted flag is the one being written.
        let Ok(_lifecycle) = shared.lifecycle.try_lock() else {
            return shared.store.config().is_running;
        };

        let active = shared
            .lock_schedule()
            .as_ref()
            .is_some_and(|s| !s.cancel.is_cancelled() && !s.handle.is_finished());
        let persisted = shared.store.config().is_running;
        if persisted != active {
            log::warn!(
                "[sync] Persisted running flag ({}) disagrees with scheduler ({}), correcting",
                persisted,
                active
            );
            if let Err(e) = shared.store.update(|doc| doc.config.is_running = active) {
                log::error!("[sync] Could not correct running flag: {}", e);
            }
        }
        active
    }

    /// Resume a sync that was running when the process last exited.
    pub async fn initialize_from_store(&self) {
        let doc = self.shared.store.snapshot();
        if !doc.config.is_running {
            log::info!("[sync] Sync was not running, waiting for start");
            return;
        }

        let credentials = Credentials::new(doc.auth.username, doc.auth.password);
        if !credentials.is_complete() {
            log::warn!("[sync] Credentials are missing, sync cannot be resumed");
            if let Err(e) = self.shared.store.mark_running(false) {
                log::error!("[sync] Could not clear running flag: {}", e);
            }
            return;
        }

        log::info!(
            "[sync] Resuming {} minute sync",
            doc.config.sync_period.minutes()
        );
        if let Err(e) = self.start_sync(doc.config.sync_period, &credentials).await {
            log::warn!("[sync] Could not resume sync: {}", e);
        }
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        if let Some(schedule) = self.shared.lock_schedule().take() {
            schedule.cancel.cancel();
        }
    }
}

async fn run_schedule(cycle: Arc<Cycle>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if !cycle.try_run().await {
            log::warn!("[sync] Previous cycle still running, skipping this tick");
        }
    }
    log::info!("[sync] Schedule stopped");
}

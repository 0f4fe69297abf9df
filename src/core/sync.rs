//! App-wide data-sync coordinator.
//!
//! Periodically probes the backend's database summary as a reachability and
//! integrity check, and on a coarser cadence drives a full refresh of the
//! credits store. Polling is resilient: a failed tick marks the session
//! unsynced and the next tick simply retries - no explicit reset exists or
//! is needed. The loop is a scoped resource: [`SyncCoordinator::start`]
//! hands back a [`PollHandle`] whose drop stops the timer, so view
//! transitions cannot leak it.

use crate::api::CreditsApi;
use crate::core::credits::CreditsStore;
use crate::mirror::{MirrorStore, Snapshot};
use crate::models::{IntegrityReport, SyncStatus};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Lifecycle of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Never started
    Idle,
    /// A full refresh is running within a tick
    Refreshing,
    /// Timer scheduled, ticks running
    PollActive,
    /// Stopped after having been active
    PollStopped,
}

/// Owner token for an active polling loop.
///
/// Dropping the handle stops the loop, which guarantees no timer outlives
/// the scope that started it. [`stop`](Self::stop) exists to make teardown
/// explicit at call sites.
pub struct PollHandle {
    coordinator: Arc<SyncCoordinator>,
}

impl PollHandle {
    /// Stops the polling loop. Equivalent to dropping the handle.
    pub fn stop(self) {}
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.coordinator.stop();
    }
}

/// Periodic background reconciliation across credits, garden, and database
/// summary data.
pub struct SyncCoordinator {
    api: Arc<dyn CreditsApi>,
    store: Arc<CreditsStore>,
    mirror: Arc<MirrorStore>,
    poll_interval: Duration,
    full_refresh_every: u32,
    status: RwLock<SyncStatus>,
    poll_state: RwLock<PollState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    /// Creates an idle coordinator. `full_refresh_every` is the number of
    /// probe ticks between full refreshes and must be at least 1.
    pub fn new(
        api: Arc<dyn CreditsApi>,
        store: Arc<CreditsStore>,
        mirror: Arc<MirrorStore>,
        poll_interval: Duration,
        full_refresh_every: u32,
    ) -> Self {
        Self {
            api,
            store,
            mirror,
            poll_interval,
            full_refresh_every: full_refresh_every.max(1),
            status: RwLock::new(SyncStatus::default()),
            poll_state: RwLock::new(PollState::Idle),
            task: Mutex::new(None),
        }
    }

    /// Current health signal, recomputed every tick.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the last tick reached the backend.
    #[must_use]
    pub fn is_data_synced(&self) -> bool {
        self.status().is_connected
    }

    /// Current lifecycle state of the polling loop.
    #[must_use]
    pub fn poll_state(&self) -> PollState {
        *self
            .poll_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_poll_state(&self, state: PollState) {
        *self
            .poll_state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn with_status_mut(&self, f: impl FnOnce(&mut SyncStatus)) {
        let mut guard = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }

    /// Starts the polling loop. Idempotent: if a loop is already active
    /// this is a no-op returning `None`, so at most one timer ever exists.
    /// The first tick fires immediately.
    pub fn start(self: &Arc<Self>) -> Option<PollHandle> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                info!("Polling already active, ignoring start");
                return None;
            }
        }

        self.set_poll_state(PollState::PollActive);
        let coordinator = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick: u32 = 0;
            loop {
                ticker.tick().await;
                tick = tick.wrapping_add(1);
                coordinator.run_tick(tick).await;
            }
        }));
        info!(
            "Polling started (interval {:?}, full refresh every {} ticks)",
            self.poll_interval, self.full_refresh_every
        );
        Some(PollHandle {
            coordinator: Arc::clone(self),
        })
    }

    /// Stops the polling loop. Safe to call when not running.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
            self.set_poll_state(PollState::PollStopped);
            info!("Polling stopped");
        }
    }

    /// One poll tick: probe the database summary, then on every
    /// `full_refresh_every`-th tick run a full refresh. Errors never escape
    /// or stop the loop - the next tick retries.
    pub(crate) async fn run_tick(&self, tick: u32) {
        match self.api.database_summary().await {
            Ok(summary) => {
                let integrity = summary.users.records > 0 && summary.credits.records > 0;
                self.with_status_mut(|status| {
                    status.is_connected = true;
                    status.data_integrity = integrity;
                    status.last_sync = Some(Utc::now());
                });
                debug!(
                    "Sync probe ok (users={}, credits={})",
                    summary.users.records, summary.credits.records
                );
            }
            Err(e) => {
                warn!("Sync probe failed: {e}");
                self.with_status_mut(|status| {
                    status.is_connected = false;
                });
            }
        }

        if tick % self.full_refresh_every == 0 {
            let previous = self.poll_state();
            self.set_poll_state(PollState::Refreshing);
            let fully_synced = self.store.refresh().await;
            if !fully_synced {
                warn!("Full refresh incomplete on tick {tick}");
            }
            self.set_poll_state(previous);
        }
    }

    /// Exports the full current-user dataset and writes a timestamped
    /// snapshot to the mirror. Returns whether the backup succeeded; never
    /// propagates an error.
    pub async fn backup(&self) -> bool {
        let bundle = match self.api.export_all().await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("Backup export failed: {e}");
                return false;
            }
        };
        let snapshot = Snapshot {
            taken_at: Utc::now(),
            total_records: bundle.total_records,
            data: bundle.data,
        };
        match self.mirror.backup_snapshot(snapshot) {
            Ok(()) => {
                info!("Backup snapshot written ({} records)", bundle.total_records);
                true
            }
            Err(e) => {
                warn!("Backup snapshot write failed: {e}");
                false
            }
        }
    }

    /// Fetches the full dataset and runs sanity checks over it. The report
    /// is informational - issues are human-readable strings, not errors.
    pub async fn validate_integrity(&self) -> IntegrityReport {
        let bundle = match self.api.export_all().await {
            Ok(bundle) => bundle,
            Err(e) => {
                return IntegrityReport {
                    is_valid: false,
                    issues: vec![format!("dataset export failed: {e}")],
                };
            }
        };

        let mut issues = Vec::new();
        if bundle.total_records == 0 {
            issues.push("export contains no records".to_string());
        }

        match bundle.data.get("users").and_then(|v| v.as_array()) {
            Some(users) if !users.is_empty() => {
                for (index, user) in users.iter().enumerate() {
                    if user.get("user_id").and_then(|v| v.as_str()).is_none() {
                        issues.push(format!("user record {index} is missing an identifier"));
                    }
                }
            }
            _ => issues.push("no user records present".to_string()),
        }

        if let Some(balances) = bundle.data.get("credits").and_then(|v| v.as_array()) {
            for balance in balances {
                let points = balance.get("total_points").and_then(serde_json::Value::as_i64);
                if let Some(points) = points {
                    if points < 0 {
                        let who = balance
                            .get("user_id")
                            .and_then(|v| v.as_str())
                            .unwrap_or("<unknown>");
                        issues.push(format!("negative balance {points} for user {who}"));
                    }
                }
            }
        }

        IntegrityReport {
            is_valid: issues.is_empty(),
            issues,
        }
    }
}

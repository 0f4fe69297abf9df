//! Credits/garden state container.
//!
//! The single in-memory authority for "current displayed balance and garden
//! status" during a session. Every mutation follows the same contract:
//! call the backend, and only on confirmed success apply the delta locally,
//! write it through to the mirror, and publish exactly one [`CreditUpdate`].
//! A failed or rejected call leaves every field untouched.
//!
//! Reconciliation is last-write-wins through [`refresh`](CreditsStore::refresh):
//! each authoritative refresh bumps a monotonic version, and a mutation whose
//! network call raced with a refresh discards its local delta (the refreshed
//! balance already includes it server-side). Mutations are additionally
//! serialized through an internal async mutex so two in-flight spends cannot
//! both pass the client-side balance check.

use crate::api::{ActivityCompletion, ChallengeCompletion, CreditsApi};
use crate::errors::{Error, Result};
use crate::events::{CreditUpdate, EventBus};
use crate::mirror::MirrorStore;
use crate::models::{CreditBalance, CreditTransaction, GardenStatus};
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

/// Result of a successful earn-type mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Displayed balance after the mutation
    pub new_balance: i64,
    /// Signed delta actually applied
    pub change: i64,
}

/// Result of a successful activity completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOutcome {
    pub new_balance: i64,
    pub points_earned: i64,
    pub carbon_saved: f64,
    pub transaction_id: Option<i64>,
}

/// Result of a successful watering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WateringOutcome {
    pub new_balance: i64,
    /// Waters applied within the current level, per the server
    pub waters_count: u32,
    pub level_up: bool,
    pub new_level: Option<u32>,
}

#[derive(Debug, Clone, Default)]
struct CreditsState {
    balance: Option<i64>,
    recent_earned: i64,
    garden: Option<GardenStatus>,
    last_updated: Option<DateTime<Utc>>,
    is_synced: bool,
    /// Bumped by every authoritative refresh; mutations compare against it
    /// to detect a refresh that landed while their call was in flight.
    version: u64,
}

/// Session-scoped state container for credits and garden status.
///
/// Constructed once per application session with its collaborators injected,
/// so tests can instantiate isolated instances against a mock API.
pub struct CreditsStore {
    api: Arc<dyn CreditsApi>,
    mirror: Arc<MirrorStore>,
    events: EventBus,
    user_id: String,
    state: RwLock<CreditsState>,
    mutation_gate: Mutex<()>,
}

impl CreditsStore {
    /// Creates a store for `user_id` with no data loaded yet; call
    /// [`refresh`](Self::refresh) to populate it.
    pub fn new(
        api: Arc<dyn CreditsApi>,
        mirror: Arc<MirrorStore>,
        user_id: impl Into<String>,
        event_capacity: usize,
    ) -> Self {
        Self {
            api,
            mirror,
            events: EventBus::new(event_capacity),
            user_id: user_id.into(),
            state: RwLock::new(CreditsState::default()),
            mutation_gate: Mutex::new(()),
        }
    }

    fn read_state(&self) -> CreditsState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_state_mut<R>(&self, f: impl FnOnce(&mut CreditsState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Server-confirmed balance, or `None` while still loading.
    #[must_use]
    pub fn balance(&self) -> Option<i64> {
        self.read_state().balance
    }

    /// The full confirmed-balance record, or `None` until a refresh or
    /// mutation has landed. This is the assembled view of what
    /// [`refresh`](Self::refresh) stores.
    #[must_use]
    pub fn credit_balance(&self) -> Option<CreditBalance> {
        let state = self.read_state();
        Some(CreditBalance {
            user_id: self.user_id.clone(),
            total_points: state.balance?,
            recent_earned: state.recent_earned,
            last_updated: state.last_updated?,
        })
    }

    /// Balance for immediate display: the in-memory value when present,
    /// otherwise the mirror's last-known value from a previous session.
    /// `None` means genuinely no data yet - render a loading state, not a
    /// made-up number.
    #[must_use]
    pub fn last_known_balance(&self) -> Option<i64> {
        self.balance().or_else(|| self.mirror.read_balance())
    }

    /// Current garden status, or `None` while still loading.
    #[must_use]
    pub fn garden(&self) -> Option<GardenStatus> {
        self.read_state().garden
    }

    /// Magnitude of the most recent earn, informational only.
    #[must_use]
    pub fn recent_earned(&self) -> i64 {
        self.read_state().recent_earned
    }

    /// Timestamp of the last successful mutation or refresh.
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_updated
    }

    /// False when the last refresh failed partially or fully.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.read_state().is_synced
    }

    /// Subscribes to balance-change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CreditUpdate> {
        self.events.subscribe()
    }

    /// Fetches balance and garden concurrently and replaces the in-memory
    /// state and mirror with the server's answer.
    ///
    /// On partial failure the previously known values for the failed parts
    /// are kept and the store reports `is_synced() == false`. Returns
    /// whether everything synced. Idempotent: two refreshes with no
    /// intervening mutation observe identical state.
    pub async fn refresh(&self) -> bool {
        let (balance_result, garden_result) = tokio::join!(
            self.api.balance(&self.user_id),
            self.api.garden(&self.user_id)
        );
        let mut fully_synced = true;

        let confirmed = match balance_result {
            Ok(response) if response.total_points >= 0 => Some(response),
            Ok(response) => {
                warn!(
                    "Server returned negative balance {}, keeping previous value",
                    response.total_points
                );
                fully_synced = false;
                None
            }
            Err(e) => {
                warn!("Balance fetch failed: {e}");
                fully_synced = false;
                None
            }
        };

        let garden = match garden_result {
            Ok(response) => Some(GardenStatus::from(response)),
            Err(e) => {
                warn!("Garden fetch failed: {e}");
                fully_synced = false;
                None
            }
        };

        self.with_state_mut(|state| {
            if let Some(response) = &confirmed {
                state.balance = Some(response.total_points);
                state.recent_earned = response.recent_earned;
                state.last_updated = Some(response.last_updated);
                state.version += 1;
            }
            if let Some(garden) = garden {
                state.garden = Some(garden);
            }
            state.is_synced = fully_synced;
        });

        // The mirror is never authoritative; every refresh overwrites it.
        if let Some(response) = confirmed {
            if let Err(e) = self.mirror.set_balance(response.total_points) {
                warn!("Mirror write failed after refresh: {e}");
            }
        }

        fully_synced
    }

    /// Earns `points` for `reason` through the generic completion endpoint.
    ///
    /// Only a confirmed `success` mutates state; the published update then
    /// carries `change == points_earned` as credited by the server.
    pub async fn earn(&self, points: i64, reason: &str) -> Result<MutationOutcome> {
        let request = ChallengeCompletion {
            user_id: self.user_id.clone(),
            challenge_id: reason.to_string(),
            title: reason.to_string(),
            points,
        };
        self.confirm_and_apply_earn(&request, reason).await
    }

    /// Records a completed challenge and credits its points.
    pub async fn complete_challenge(
        &self,
        challenge_id: &str,
        title: &str,
        points: i64,
    ) -> Result<MutationOutcome> {
        let request = ChallengeCompletion {
            user_id: self.user_id.clone(),
            challenge_id: challenge_id.to_string(),
            title: title.to_string(),
            points,
        };
        let reason = format!("challenge:{challenge_id}");
        self.confirm_and_apply_earn(&request, &reason).await
    }

    /// Records a completed mobility activity and credits its points.
    ///
    /// `mode` is the user-facing mobility mode (possibly localized);
    /// `route` is an optional free-text route description.
    pub async fn complete_activity(
        &self,
        mode: &str,
        distance_km: f64,
        carbon_saved: f64,
        points: i64,
        route: Option<&str>,
    ) -> Result<ActivityOutcome> {
        let _gate = self.mutation_gate.lock().await;
        let version_before = self.read_state().version;

        let request = ActivityCompletion {
            user_id: self.user_id.clone(),
            mode: mode.to_string(),
            distance_km,
            carbon_saved,
            points,
            route: route.map(str::to_string),
        };
        let receipt = self.api.complete_activity(&request).await?;
        if !receipt.success {
            return Err(Error::Rejected {
                message: receipt
                    .message
                    .unwrap_or_else(|| "activity completion rejected".to_string()),
            });
        }

        info!(
            "Activity '{mode}' completed: +{} points, {} kg CO2 saved",
            receipt.points_earned, receipt.carbon_saved
        );
        let outcome = self.apply_confirmed_earn(
            version_before,
            receipt.points_earned,
            &format!("activity:{mode}"),
        );
        Ok(ActivityOutcome {
            new_balance: outcome.new_balance,
            points_earned: receipt.points_earned,
            carbon_saved: receipt.carbon_saved,
            transaction_id: receipt.transaction_id,
        })
    }

    /// Spends `cost` points on one unit of watering.
    ///
    /// The client-side balance check is advisory only - it avoids calls that
    /// would obviously fail, but the server remains authoritative and may
    /// still reject on a stale balance. Success subtracts the cost, updates
    /// the garden from the response, and publishes one update with a
    /// negative delta. Rejection mutates nothing.
    pub async fn water(&self, cost: i64) -> Result<WateringOutcome> {
        let _gate = self.mutation_gate.lock().await;
        let (version_before, current) = {
            let state = self.read_state();
            (state.version, state.balance)
        };
        let current = current.ok_or(Error::BalanceUnknown)?;
        if current < cost {
            return Err(Error::InsufficientPoints {
                current,
                required: cost,
            });
        }

        let result = self.api.water(&self.user_id, cost).await?;
        if !result.success {
            return Err(Error::Rejected {
                message: result
                    .message
                    .unwrap_or_else(|| "watering rejected".to_string()),
            });
        }

        let (new_balance, applied_locally) = self.with_state_mut(|state| {
            let (new_balance, applied_locally) = if state.version == version_before {
                let new_balance = current - cost;
                if result.remaining_points != new_balance {
                    // Server arithmetic disagrees with ours; the next
                    // refresh reconciles to the server's value.
                    warn!(
                        "Balance drift after watering: local {new_balance}, server {}",
                        result.remaining_points
                    );
                }
                state.balance = Some(new_balance);
                state.last_updated = Some(Utc::now());
                (new_balance, true)
            } else {
                // A refresh landed while the call was in flight; its balance
                // already includes this spend, so the local delta is stale.
                debug!("Discarding stale watering delta, refresh already landed");
                (state.balance.unwrap_or(0), false)
            };
            if let Some(garden) = &mut state.garden {
                garden.waters_count = result.waters_count;
                if result.level_up {
                    if let Some(new_level) = result.new_level {
                        info!("Garden leveled up to {new_level}");
                        garden.level_number = new_level;
                    }
                }
            }
            (new_balance, applied_locally)
        });

        if applied_locally {
            if let Err(e) = self.mirror.apply_delta(-cost) {
                warn!("Mirror write failed after watering: {e}");
            }
        }
        self.events.publish(CreditUpdate {
            new_balance,
            change: -cost,
            reason: "garden_watering".to_string(),
        });

        Ok(WateringOutcome {
            new_balance,
            waters_count: result.waters_count,
            level_up: result.level_up,
            new_level: result.new_level,
        })
    }

    /// Fetches the most recent ledger entries, newest first. Returns an
    /// empty list on failure so list rendering never deals with an error
    /// case.
    pub async fn history(&self, limit: u32) -> Vec<CreditTransaction> {
        match self.api.history(&self.user_id, limit).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("History fetch failed, returning empty list: {e}");
                Vec::new()
            }
        }
    }

    async fn confirm_and_apply_earn(
        &self,
        request: &ChallengeCompletion,
        reason: &str,
    ) -> Result<MutationOutcome> {
        let _gate = self.mutation_gate.lock().await;
        let version_before = self.read_state().version;

        let receipt = self.api.complete_challenge(request).await?;
        if !receipt.success {
            return Err(Error::Rejected {
                message: receipt
                    .message
                    .unwrap_or_else(|| "completion rejected".to_string()),
            });
        }

        info!(
            "'{}' completed: +{} points",
            request.title, receipt.points_earned
        );
        Ok(self.apply_confirmed_earn(version_before, receipt.points_earned, reason))
    }

    /// Applies a server-confirmed earned delta, unless a refresh landed
    /// while the confirming call was in flight (then the refreshed balance
    /// already includes it). Publishes exactly one update either way.
    fn apply_confirmed_earn(
        &self,
        version_before: u64,
        earned: i64,
        reason: &str,
    ) -> MutationOutcome {
        let (new_balance, applied_locally) = self.with_state_mut(|state| {
            if state.version == version_before {
                let new_balance = state.balance.unwrap_or(0) + earned;
                state.balance = Some(new_balance);
                state.recent_earned = earned;
                state.last_updated = Some(Utc::now());
                (new_balance, true)
            } else {
                debug!("Discarding stale earn delta, refresh already landed");
                (state.balance.unwrap_or(0), false)
            }
        });

        if applied_locally {
            if let Err(e) = self.mirror.apply_delta(earned) {
                warn!("Mirror write failed after earn: {e}");
            }
        }
        self.events.publish(CreditUpdate {
            new_balance,
            change: earned,
            reason: reason.to_string(),
        });
        MutationOutcome {
            new_balance,
            change: earned,
        }
    }
}

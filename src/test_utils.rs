//! Shared test utilities for the Ecoo sync core.
//!
//! [`MockCreditsApi`] is a tiny in-memory backend: it keeps its own balance,
//! garden, and ledger, applies the same fail-closed rules as the real
//! server, and exposes switches for network failure and business rejection
//! so tests can script each scenario. Helper functions wire it to a store
//! or coordinator with an in-memory mirror.

#![allow(clippy::unwrap_used)]

use crate::api::{
    ActivityCompletion, ActivityReceipt, BalanceResponse, ChallengeCompletion, CompletionReceipt,
    CreditsApi, DatabaseSummary, ExportBundle, GardenResponse, TableCounts, WateringResult,
};
use crate::core::credits::CreditsStore;
use crate::core::sync::SyncCoordinator;
use crate::errors::{Error, Result};
use crate::mirror::MirrorStore;
use crate::models::{CreditTransaction, TransactionKind};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// User id every helper wires up.
pub const TEST_USER: &str = "test_user";

#[derive(Debug)]
struct MockBackend {
    total_points: i64,
    recent_earned: i64,
    waters_count: u32,
    required_waters: u32,
    level_number: u32,
    history: Vec<CreditTransaction>,
    next_entry_id: i64,
    fail_network: bool,
    fail_garden: bool,
    fail_summary: bool,
    reject_water: bool,
    reject_completions: bool,
    user_records: i64,
    credit_records: i64,
    export_override: Option<ExportBundle>,
}

/// Scripted in-memory stand-in for the Ecoo backend.
pub struct MockCreditsApi {
    backend: Mutex<MockBackend>,
    water_gate: Mutex<Option<Arc<Notify>>>,
    /// Calls to the balance endpoint (one per refresh)
    pub balance_calls: AtomicU32,
    /// Calls to the watering endpoint
    pub water_calls: AtomicU32,
    /// Calls to the database-summary probe
    pub summary_calls: AtomicU32,
}

impl MockCreditsApi {
    /// Creates a backend holding `total_points` for [`TEST_USER`], a level-1
    /// garden needing 10 waters, and a healthy database summary.
    #[must_use]
    pub fn new(total_points: i64) -> Self {
        Self {
            backend: Mutex::new(MockBackend {
                total_points,
                recent_earned: 0,
                waters_count: 0,
                required_waters: 10,
                level_number: 1,
                history: Vec::new(),
                next_entry_id: 1,
                fail_network: false,
                fail_garden: false,
                fail_summary: false,
                reject_water: false,
                reject_completions: false,
                user_records: 1,
                credit_records: 1,
                export_override: None,
            }),
            water_gate: Mutex::new(None),
            balance_calls: AtomicU32::new(0),
            water_calls: AtomicU32::new(0),
            summary_calls: AtomicU32::new(0),
        }
    }

    /// Sets the server-side balance directly (e.g., to model mutations that
    /// happened in another session).
    pub fn set_total_points(&self, points: i64) {
        self.backend.lock().unwrap().total_points = points;
    }

    /// Makes every endpoint fail with a network error.
    pub fn set_fail_network(&self, fail: bool) {
        self.backend.lock().unwrap().fail_network = fail;
    }

    /// Makes only the garden endpoint fail, for partial-refresh scenarios.
    pub fn set_fail_garden(&self, fail: bool) {
        self.backend.lock().unwrap().fail_garden = fail;
    }

    /// Makes only the database-summary probe fail.
    pub fn set_fail_summary(&self, fail: bool) {
        self.backend.lock().unwrap().fail_summary = fail;
    }

    /// Forces the watering endpoint to reject with `success: false`.
    pub fn set_reject_water(&self, reject: bool) {
        self.backend.lock().unwrap().reject_water = reject;
    }

    /// Forces both completion endpoints to reject with `success: false`.
    pub fn set_reject_completions(&self, reject: bool) {
        self.backend.lock().unwrap().reject_completions = reject;
    }

    /// Positions the garden within its current level.
    pub fn set_garden_progress(&self, waters_count: u32, required_waters: u32) {
        let mut backend = self.backend.lock().unwrap();
        backend.waters_count = waters_count;
        backend.required_waters = required_waters;
    }

    /// Overrides the per-table counts reported by the summary probe.
    pub fn set_summary_counts(&self, users: i64, credits: i64) {
        let mut backend = self.backend.lock().unwrap();
        backend.user_records = users;
        backend.credit_records = credits;
    }

    /// Replaces the export payload returned by `export_all`.
    pub fn set_export(&self, bundle: ExportBundle) {
        self.backend.lock().unwrap().export_override = Some(bundle);
    }

    /// Parks the next watering call until `gate` is notified, so a test can
    /// interleave a refresh while the call is in flight.
    pub fn hold_water(&self, gate: Arc<Notify>) {
        *self.water_gate.lock().unwrap() = Some(gate);
    }

    fn push_entry(backend: &mut MockBackend, kind: TransactionKind, points: i64, reason: &str) {
        let entry = CreditTransaction {
            entry_id: backend.next_entry_id,
            kind,
            points,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        backend.next_entry_id += 1;
        backend.history.push(entry);
    }
}

#[async_trait]
impl CreditsApi for MockCreditsApi {
    async fn balance(&self, user_id: &str) -> Result<BalanceResponse> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let backend = self.backend.lock().unwrap();
        if backend.fail_network {
            return Err(Error::Network("mock: connection refused".to_string()));
        }
        Ok(BalanceResponse {
            user_id: user_id.to_string(),
            total_points: backend.total_points,
            recent_earned: backend.recent_earned,
            last_updated: Utc::now(),
        })
    }

    async fn garden(&self, _user_id: &str) -> Result<GardenResponse> {
        let backend = self.backend.lock().unwrap();
        if backend.fail_network || backend.fail_garden {
            return Err(Error::Network("mock: connection refused".to_string()));
        }
        Ok(GardenResponse {
            level_number: backend.level_number,
            level_name: format!("Level {}", backend.level_number),
            waters_count: backend.waters_count,
            required_waters: backend.required_waters,
        })
    }

    async fn water(&self, _user_id: &str, points_spent: i64) -> Result<WateringResult> {
        self.water_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.water_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut backend = self.backend.lock().unwrap();
        if backend.fail_network {
            return Err(Error::Network("mock: connection refused".to_string()));
        }
        if backend.reject_water || points_spent > backend.total_points {
            return Ok(WateringResult {
                success: false,
                waters_count: backend.waters_count,
                total_waters: 0,
                level_up: false,
                new_level: None,
                remaining_points: backend.total_points,
                message: Some("insufficient points".to_string()),
            });
        }

        backend.total_points -= points_spent;
        backend.waters_count += 1;
        let level_up = backend.waters_count >= backend.required_waters;
        if level_up {
            backend.level_number += 1;
            backend.waters_count = 0;
        }
        Self::push_entry(
            &mut backend,
            TransactionKind::Spend,
            -points_spent,
            "garden_watering",
        );
        Ok(WateringResult {
            success: true,
            waters_count: backend.waters_count,
            total_waters: 0,
            level_up,
            new_level: level_up.then_some(backend.level_number),
            remaining_points: backend.total_points,
            message: None,
        })
    }

    async fn complete_challenge(&self, request: &ChallengeCompletion) -> Result<CompletionReceipt> {
        let mut backend = self.backend.lock().unwrap();
        if backend.fail_network {
            return Err(Error::Network("mock: connection refused".to_string()));
        }
        if backend.reject_completions {
            return Ok(CompletionReceipt {
                success: false,
                points_earned: 0,
                transaction_id: None,
                message: Some("challenge already completed".to_string()),
            });
        }
        backend.total_points += request.points;
        backend.recent_earned = request.points;
        Self::push_entry(
            &mut backend,
            TransactionKind::Earn,
            request.points,
            &request.challenge_id,
        );
        Ok(CompletionReceipt {
            success: true,
            points_earned: request.points,
            transaction_id: Some(backend.next_entry_id - 1),
            message: None,
        })
    }

    async fn complete_activity(&self, request: &ActivityCompletion) -> Result<ActivityReceipt> {
        let mut backend = self.backend.lock().unwrap();
        if backend.fail_network {
            return Err(Error::Network("mock: connection refused".to_string()));
        }
        if backend.reject_completions {
            return Ok(ActivityReceipt {
                success: false,
                points_earned: 0,
                carbon_saved: 0.0,
                transaction_id: None,
                mobility_log_id: None,
                message: Some("activity rejected".to_string()),
            });
        }
        backend.total_points += request.points;
        backend.recent_earned = request.points;
        Self::push_entry(
            &mut backend,
            TransactionKind::Earn,
            request.points,
            &format!("activity:{}", request.mode),
        );
        Ok(ActivityReceipt {
            success: true,
            points_earned: request.points,
            carbon_saved: request.carbon_saved,
            transaction_id: Some(backend.next_entry_id - 1),
            mobility_log_id: Some(backend.next_entry_id - 1),
            message: None,
        })
    }

    async fn history(&self, _user_id: &str, limit: u32) -> Result<Vec<CreditTransaction>> {
        let backend = self.backend.lock().unwrap();
        if backend.fail_network {
            return Err(Error::Network("mock: connection refused".to_string()));
        }
        // Newest first, like the real endpoint.
        Ok(backend
            .history
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn database_summary(&self) -> Result<DatabaseSummary> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let backend = self.backend.lock().unwrap();
        if backend.fail_network || backend.fail_summary {
            return Err(Error::Network("mock: connection refused".to_string()));
        }
        Ok(DatabaseSummary {
            users: TableCounts {
                records: backend.user_records,
            },
            credits: TableCounts {
                records: backend.credit_records,
            },
            mobility: TableCounts { records: 0 },
            challenges: TableCounts { records: 0 },
        })
    }

    async fn export_all(&self) -> Result<ExportBundle> {
        let backend = self.backend.lock().unwrap();
        if backend.fail_network {
            return Err(Error::Network("mock: connection refused".to_string()));
        }
        if let Some(bundle) = &backend.export_override {
            return Ok(bundle.clone());
        }
        Ok(ExportBundle {
            export_timestamp: Utc::now(),
            total_records: 1 + backend.history.len() as i64,
            data: serde_json::json!({
                "users": [{"user_id": TEST_USER}],
                "credits": [{"user_id": TEST_USER, "total_points": backend.total_points}],
                "transactions": backend.history,
            }),
        })
    }
}

/// Wires a store for [`TEST_USER`] to a fresh mock backend and an in-memory
/// mirror. This is the standard setup for state-container tests.
pub fn setup_store(
    total_points: i64,
) -> (Arc<CreditsStore>, Arc<MockCreditsApi>, Arc<MirrorStore>) {
    let api = Arc::new(MockCreditsApi::new(total_points));
    let mirror = Arc::new(MirrorStore::in_memory());
    let store = Arc::new(CreditsStore::new(
        Arc::clone(&api) as Arc<dyn CreditsApi>,
        Arc::clone(&mirror),
        TEST_USER,
        16,
    ));
    (store, api, mirror)
}

/// Wires a full coordinator on top of [`setup_store`] with a 30-second poll
/// interval (tests drive ticks directly or through a paused clock).
pub fn setup_coordinator(
    total_points: i64,
    full_refresh_every: u32,
) -> (Arc<SyncCoordinator>, Arc<MockCreditsApi>, Arc<MirrorStore>) {
    let (store, api, mirror) = setup_store(total_points);
    let coordinator = Arc::new(SyncCoordinator::new(
        Arc::clone(&api) as Arc<dyn CreditsApi>,
        store,
        Arc::clone(&mirror),
        Duration::from_secs(30),
        full_refresh_every,
    ));
    (coordinator, api, mirror)
}

//! Domain models for the credits and garden layer.
//!
//! These are the in-memory shapes the state container and sync coordinator
//! operate on. Wire-level request/response types live in [`crate::api`];
//! everything here is backend-confirmed data or locally derived status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last server-confirmed credit balance for a user.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CreditBalance {
    /// Opaque user identifier, owned by the auth/session layer
    pub user_id: String,
    /// Total eco credits; never persisted negative
    pub total_points: i64,
    /// Magnitude of the most recent earn, informational only
    pub recent_earned: i64,
    /// Timestamp of the last successful mutation or refresh
    pub last_updated: DateTime<Utc>,
}

/// Current state of a user's virtual garden.
///
/// Mutated only through the watering operation; one water unit per call,
/// atomic on the server. Level transitions are computed server-side when
/// `waters_count` crosses `required_waters`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GardenStatus {
    /// Garden level, starts at 1
    pub level_number: u32,
    /// Display name for the current level (e.g., "Sprout")
    pub level_name: String,
    /// Waters applied within the current level
    pub waters_count: u32,
    /// Waters needed to reach the next level
    pub required_waters: u32,
}

/// Ledger entry classification.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Earn,
    Spend,
    Adjust,
}

/// A single append-only credit ledger entry.
///
/// The client only ever appends (via completion calls) and reads (via the
/// history fetch); entries are never mutated or deleted client-side.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CreditTransaction {
    pub entry_id: i64,
    /// EARN, SPEND, or ADJUST
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Signed magnitude matching `kind`
    pub points: i64,
    /// Free-text classification (e.g., "garden_watering", "activity:bike")
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Health signal recomputed on every poll tick.
///
/// Ephemeral; not persisted beyond the session except as part of a
/// best-effort mirror snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct SyncStatus {
    /// Whether the backend was reachable on the last tick
    pub is_connected: bool,
    /// Timestamp of the last successful full refresh
    pub last_sync: Option<DateTime<Utc>>,
    /// Coarse heuristic: user count > 0 and credit record count > 0
    pub data_integrity: bool,
}

/// Outcome of a dataset sanity check, informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub is_valid: bool,
    /// Human-readable problems; empty when `is_valid`
    pub issues: Vec<String>,
}

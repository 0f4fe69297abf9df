//! Remote API client - typed wrappers over the Ecoo backend contracts.
//!
//! The [`CreditsApi`] trait is the seam between the state container and the
//! network: production code uses [`http::HttpCreditsApi`], tests inject a
//! scripted mock. Implementations are pure with respect to local state - no
//! storage writes and no event publication happen here; that coordination
//! belongs to the state container.
//!
//! Wire types mirror the backend's snake_case JSON field names exactly.
//! Transport failures are normalized into [`crate::errors::Error`] variants;
//! business rejections (e.g., insufficient points on watering) arrive as a
//! `success: false` payload, not as an `Err`.

/// HTTP implementation over `reqwest`
pub mod http;

use crate::errors::Result;
use crate::models::CreditTransaction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response of `GET /api/credits/balance/{userId}`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BalanceResponse {
    pub user_id: String,
    pub total_points: i64,
    #[serde(default)]
    pub recent_earned: i64,
    pub last_updated: DateTime<Utc>,
}

/// Response of `GET /api/credits/garden/{userId}`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct GardenResponse {
    pub level_number: u32,
    pub level_name: String,
    pub waters_count: u32,
    pub required_waters: u32,
}

impl From<GardenResponse> for crate::models::GardenStatus {
    fn from(value: GardenResponse) -> Self {
        Self {
            level_number: value.level_number,
            level_name: value.level_name,
            waters_count: value.waters_count,
            required_waters: value.required_waters,
        }
    }
}

/// Response of `POST /api/credits/garden/water`.
///
/// Fails closed: on `success: false` nothing was charged server-side and the
/// caller must not mutate local state.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WateringResult {
    pub success: bool,
    /// Waters applied within the current level after this call
    #[serde(default)]
    pub waters_count: u32,
    /// Lifetime waters across all levels
    #[serde(default)]
    pub total_waters: u32,
    #[serde(default)]
    pub level_up: bool,
    #[serde(default)]
    pub new_level: Option<u32>,
    /// Server-confirmed balance after the spend
    #[serde(default)]
    pub remaining_points: i64,
    /// Rejection reason when `success` is false
    #[serde(default)]
    pub message: Option<String>,
}

/// Request body of `POST /api/credits/challenge/complete`.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ChallengeCompletion {
    pub user_id: String,
    pub challenge_id: String,
    pub title: String,
    pub points: i64,
}

/// Response of `POST /api/credits/challenge/complete`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CompletionReceipt {
    pub success: bool,
    #[serde(default)]
    pub points_earned: i64,
    #[serde(default)]
    pub transaction_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Request body of `POST /api/credits/activity/complete`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ActivityCompletion {
    pub user_id: String,
    /// Mobility mode as entered by the user (may be localized, e.g. "지하철")
    pub mode: String,
    pub distance_km: f64,
    pub carbon_saved: f64,
    pub points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

/// Response of `POST /api/credits/activity/complete`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ActivityReceipt {
    pub success: bool,
    #[serde(default)]
    pub points_earned: i64,
    #[serde(default)]
    pub carbon_saved: f64,
    #[serde(default)]
    pub transaction_id: Option<i64>,
    #[serde(default)]
    pub mobility_log_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Per-domain record counts from `GET /api/database/summary`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    #[serde(default)]
    pub records: i64,
}

/// Response of `GET /api/database/summary`. Used as the lightweight
/// reachability/integrity probe on every poll tick.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseSummary {
    #[serde(default)]
    pub users: TableCounts,
    #[serde(default)]
    pub credits: TableCounts,
    #[serde(default)]
    pub mobility: TableCounts,
    #[serde(default)]
    pub challenges: TableCounts,
}

/// Response of `GET /api/database/export/all`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ExportBundle {
    pub export_timestamp: DateTime<Utc>,
    pub total_records: i64,
    /// Raw per-table payloads, keyed by table name
    pub data: serde_json::Value,
}

/// Operations the state container and sync coordinator need from the
/// backend. Every method maps to exactly one HTTP call; callers decide how
/// to fall back on `Err`.
#[async_trait]
pub trait CreditsApi: Send + Sync {
    /// Fetches the current confirmed balance.
    async fn balance(&self, user_id: &str) -> Result<BalanceResponse>;

    /// Fetches the current garden status.
    async fn garden(&self, user_id: &str) -> Result<GardenResponse>;

    /// Spends `points_spent` on one unit of watering. Server-atomic.
    async fn water(&self, user_id: &str, points_spent: i64) -> Result<WateringResult>;

    /// Records a completed challenge and credits its points.
    async fn complete_challenge(&self, request: &ChallengeCompletion) -> Result<CompletionReceipt>;

    /// Records a completed mobility activity and credits its points.
    async fn complete_activity(&self, request: &ActivityCompletion) -> Result<ActivityReceipt>;

    /// Fetches the most recent ledger entries, newest first.
    async fn history(&self, user_id: &str, limit: u32) -> Result<Vec<CreditTransaction>>;

    /// Lightweight per-table record counts for health probing.
    async fn database_summary(&self) -> Result<DatabaseSummary>;

    /// Full dataset export for backup and integrity validation.
    async fn export_all(&self) -> Result<ExportBundle>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_watering_result_rejection_shape() {
        // Business rejection: success=false plus message, not an HTTP error.
        let result: WateringResult = serde_json::from_str(
            r#"{"success": false, "message": "insufficient points"}"#,
        )
        .unwrap();
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("insufficient points"));
        assert_eq!(result.waters_count, 0);
        assert!(result.new_level.is_none());
    }

    #[test]
    fn test_watering_result_level_up_shape() {
        let result: WateringResult = serde_json::from_str(
            r#"{
                "success": true,
                "waters_count": 0,
                "total_waters": 10,
                "level_up": true,
                "new_level": 2,
                "remaining_points": 90
            }"#,
        )
        .unwrap();
        assert!(result.success);
        assert!(result.level_up);
        assert_eq!(result.new_level, Some(2));
        assert_eq!(result.remaining_points, 90);
    }

    #[test]
    fn test_activity_completion_omits_missing_route() {
        let body = serde_json::to_value(ActivityCompletion {
            user_id: "u1".to_string(),
            mode: "bike".to_string(),
            distance_km: 3.2,
            carbon_saved: 0.4,
            points: 80,
            route: None,
        })
        .unwrap();
        assert!(body.get("route").is_none());
        assert_eq!(body["mode"], "bike");
    }

    #[test]
    fn test_database_summary_tolerates_missing_domains() {
        let summary: DatabaseSummary =
            serde_json::from_str(r#"{"users": {"records": 3}}"#).unwrap();
        assert_eq!(summary.users.records, 3);
        assert_eq!(summary.credits.records, 0);
    }

    #[test]
    fn test_balance_response_snake_case_fields() {
        let balance: BalanceResponse = serde_json::from_str(
            r#"{
                "user_id": "u1",
                "total_points": 1240,
                "recent_earned": 150,
                "last_updated": "2026-08-01T09:30:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(balance.total_points, 1240);
        assert_eq!(balance.recent_earned, 150);
    }
}

//! `reqwest`-backed implementation of [`CreditsApi`].
//!
//! Every request carries a bounded timeout so a stalled backend surfaces as
//! [`Error::Timeout`] rather than hanging the caller; connection-level
//! failures become [`Error::Network`]; non-2xx responses become
//! [`Error::Api`] with the response body as the message.

use crate::api::{
    ActivityCompletion, ActivityReceipt, BalanceResponse, ChallengeCompletion, CompletionReceipt,
    CreditsApi, DatabaseSummary, ExportBundle, GardenResponse, WateringResult,
};
use crate::errors::{Error, Result};
use crate::models::CreditTransaction;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout when the configuration does not override it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the Ecoo backend.
pub struct HttpCreditsApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCreditsApi {
    /// Builds a client against `base_url` (scheme + host, no trailing
    /// slash) with the given per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {path}");
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!("POST {path}");
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        response.json::<T>().await.map_err(Error::from)
    }
}

#[async_trait]
impl CreditsApi for HttpCreditsApi {
    async fn balance(&self, user_id: &str) -> Result<BalanceResponse> {
        self.get_json(&format!("/api/credits/balance/{user_id}")).await
    }

    async fn garden(&self, user_id: &str) -> Result<GardenResponse> {
        self.get_json(&format!("/api/credits/garden/{user_id}")).await
    }

    async fn water(&self, user_id: &str, points_spent: i64) -> Result<WateringResult> {
        let body = serde_json::json!({
            "user_id": user_id,
            "points_spent": points_spent,
        });
        self.post_json("/api/credits/garden/water", &body).await
    }

    async fn complete_challenge(&self, request: &ChallengeCompletion) -> Result<CompletionReceipt> {
        self.post_json("/api/credits/challenge/complete", request).await
    }

    async fn complete_activity(&self, request: &ActivityCompletion) -> Result<ActivityReceipt> {
        self.post_json("/api/credits/activity/complete", request).await
    }

    async fn history(&self, user_id: &str, limit: u32) -> Result<Vec<CreditTransaction>> {
        self.get_json(&format!("/api/credits/history/{user_id}?limit={limit}"))
            .await
    }

    async fn database_summary(&self) -> Result<DatabaseSummary> {
        self.get_json("/api/database/summary").await
    }

    async fn export_all(&self) -> Result<ExportBundle> {
        self.get_json("/api/database/export/all").await
    }
}

#![allow(clippy::result_large_err)]

//! Demo binary: wires the sync core against a live backend and polls until
//! interrupted.

use dotenvy::dotenv;
use ecoo_sync::api::CreditsApi;
use ecoo_sync::api::http::HttpCreditsApi;
use ecoo_sync::core::credits::CreditsStore;
use ecoo_sync::core::sync::SyncCoordinator;
use ecoo_sync::errors::{Error, Result};
use ecoo_sync::mirror::MirrorStore;
use ecoo_sync::{config, models::SyncStatus};
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file (as early as possible)
    dotenv().ok(); // Make it non-fatal, env vars can be set externally
    info!("Attempted to load .env file.");

    // 3. Load the main application configuration
    let app_config = config::load_app_configuration()?;
    info!("Successfully processed application configuration.");

    // 4. ECOO_USER_ID is loaded here, directly before use, not stored in AppConfig
    let user_id = env::var("ECOO_USER_ID")
        .inspect_err(|e| error!("ECOO_USER_ID not found: {e}"))
        .map_err(Error::EnvVar)?;

    // 5. Build the collaborators: API client, mirror, state container
    let api: Arc<dyn CreditsApi> = Arc::new(HttpCreditsApi::new(
        &app_config.api_base_url,
        app_config.request_timeout(),
    )?);
    let mirror = Arc::new(MirrorStore::open(&app_config.mirror_path));
    let store = Arc::new(CreditsStore::new(
        Arc::clone(&api),
        Arc::clone(&mirror),
        user_id,
        app_config.event_capacity,
    ));

    match store.last_known_balance() {
        Some(balance) => info!("Last known balance before refresh: {balance}"),
        None => info!("No mirrored balance yet, waiting for first refresh."),
    }

    if store.refresh().await {
        match store.credit_balance() {
            Some(balance) => info!(
                "Initial refresh complete, {} has {} points.",
                balance.user_id, balance.total_points
            ),
            None => info!("Initial refresh complete, no balance on record yet."),
        }
    } else {
        error!("Initial refresh incomplete; continuing with polling.");
    }

    // 6. Start background polling
    let coordinator = Arc::new(SyncCoordinator::new(
        api,
        Arc::clone(&store),
        mirror,
        app_config.poll_interval(),
        app_config.full_refresh_every,
    ));
    let Some(poll) = coordinator.start() else {
        return Err(Error::Config {
            message: "Polling loop failed to start".to_string(),
        });
    };
    info!("Polling started; press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;

    let SyncStatus {
        is_connected,
        last_sync,
        ..
    } = coordinator.status();
    info!("Shutting down (connected: {is_connected}, last sync: {last_sync:?}).");
    poll.stop();

    Ok(())
}

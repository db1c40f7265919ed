//! Stride Agent - background sync for the Stride local store.
//!
//! Opens the local store, keeps an eye on the remote authority's reachability
//! and drains the pending operation queue on a timer and whenever the
//! connection comes back.

use std::sync::Arc;
use stride_client::{
    Config, ConnectivityMonitor, ConnectivityProbe, LocalStore, PendingQueue, ProbeConfig,
    RemoteAdapter, RestRemote, SyncEngine,
};
use stride_engine::Schema;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stride_client=debug,stride_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(remote = %config.remote_url, "Starting Stride agent");

    // Open the local store
    let store = Arc::new(LocalStore::new(&config.database_url, Schema::standard()?));
    store.init().await?;

    // Build the remote
    let mut rest = RestRemote::new(&config.remote_url)?;
    if let Some(key) = &config.remote_api_key {
        rest = rest.with_api_key(key);
    }
    if let Some(token) = &config.access_token {
        rest = rest.with_access_token(token);
    }
    let health_url = rest.health_url();
    let remote = RemoteAdapter::new(Arc::new(rest));

    // Read the initial connection state before anything syncs
    let monitor = Arc::new(ConnectivityMonitor::default());
    let probe = Arc::new(ConnectivityProbe::new(
        Arc::clone(&monitor),
        ProbeConfig::new(health_url, config.probe_interval),
    )?);
    let initial = probe.probe_once().await;
    tracing::info!(state = %initial, "Initial connection state");

    // Build the sync engine
    let queue = Arc::new(PendingQueue::new(Arc::clone(&store)));
    let engine = Arc::new(SyncEngine::new(queue, remote, Arc::clone(&monitor)));
    engine.configure(config.sync_options())?;

    match &config.principal {
        Some(principal) => engine.set_principal(principal.as_str()),
        None => tracing::warn!("STRIDE_PRINCIPAL is not set; nothing will be synced"),
    }

    let probe_task = Arc::clone(&probe).spawn();
    engine.watch_connectivity();
    engine.start_auto_sync(None)?;

    if engine.trigger_sync().await {
        tracing::info!("Initial sync complete");
    }

    tracing::info!("Agent running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    probe_task.abort();
    engine.shutdown();
    store.close().await;

    Ok(())
}

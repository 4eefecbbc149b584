mod api;
mod config;
mod container;
mod error;
mod store;
mod store_manager;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use futures::stream::{FuturesUnordered, StreamExt};
use anyhow::{Context, Result};
use crate::config::Config;
use crate::container::lifecycle::Lifecycle;
use crate::container::registry::ContainerRegistry;
use crate::container::service_instance::host_records;
use crate::container::snapshot;
use crate::store::RecordQuery;
use crate::store_manager::StoreHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ddnssd=info"))
        )
        .init();

    tracing::info!("Starting ddnssd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/ddnssd/ddnssd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    let config = Arc::new(config);

    tracing::info!("Loaded config from {}", config_path);

    // Open record store
    let store = store::open(&config.backend, config.zone())?;
    tracing::info!("Opened {:?} record store for zone {}", config.backend.kind, config.zone());

    let initial_records = store.lookup(&RecordQuery::all())?;
    let initial_digest = store::hash::compute_digest(&initial_records);
    tracing::info!("Initial record set digest: {} ({} records)", initial_digest, initial_records.len());

    let (digest_tx, digest_rx) = watch::channel(initial_digest);

    // Start store thread
    let store_handle = StoreHandle::spawn(store, digest_tx);

    // Publish the host name that published ports resolve to
    let host = host_records(&config.discovery);
    if host.is_empty() {
        tracing::warn!(
            "No host addresses configured; SRV records for published ports will point at an unresolvable {}",
            config.discovery.host_dns_name()
        );
    } else {
        store_handle.publish_host_records(host).await?;
        tracing::info!("Published host records for {}", config.discovery.host_dns_name());
    }

    // Reconcile the containers present at startup
    if let Some(snapshot_path) = std::env::args().nth(2) {
        let snapshots = snapshot::load_snapshots(&snapshot_path)?;
        tracing::info!("Loaded {} container snapshots from {}", snapshots.len(), snapshot_path);

        let states: HashMap<String, (Lifecycle, bool)> = snapshots
            .iter()
            .map(|s| {
                let state = s.state.as_ref();
                let gone = state.is_some_and(|st| st.is_gone());
                (s.id.clone(), (Lifecycle::from_state(state), gone))
            })
            .collect();

        let registry = ContainerRegistry::new();
        let discovery = Arc::new(config.discovery.clone());

        let mut pending = FuturesUnordered::new();
        for (id, result) in registry.build(&snapshots, discovery) {
            let Ok(container) = result else {
                continue;
            };
            let (state, gone) = states.get(&id).copied().unwrap_or((Lifecycle::Observed, false));
            let handle = store_handle.clone();
            let registry = registry.clone();
            pending.push(async move {
                let name = container.name().to_string();
                let result = if gone {
                    let retired = handle.retire(container).await;
                    registry.remove(&name);
                    retired
                } else {
                    handle.reconcile(container, state).await
                };
                (name, state, result)
            });
        }

        while let Some((name, state, result)) = pending.next().await {
            match result {
                Ok(()) => tracing::debug!("Reconciled {} as {}", name, state),
                Err(e) => tracing::error!("Failed to reconcile {} as {}: {:#}", name, state, e),
            }
        }

        if registry.is_empty() {
            tracing::info!("Startup reconciliation done; no live containers");
        } else {
            tracing::info!("Startup reconciliation done for {} live containers", registry.len());
        }
    } else {
        tracing::info!("No container snapshot file given; serving existing records only");
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Build API router
    let app_state = api::routes::AppState {
        store: store_handle.clone(),
        digest_rx,
        config: Arc::clone(&config),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();
    let _ = server_handle.await;

    // Shutdown store thread
    if let Err(e) = store_handle.shutdown().await {
        tracing::error!("Failed to shutdown record store: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

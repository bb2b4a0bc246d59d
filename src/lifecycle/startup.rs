//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, metrics and the client registry in order
//! - Start background tasks (server list refresh, health checks, config reload)
//! - Bind the admin listener last, then wait for a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A broken config watcher is logged, not fatal; the process keeps the loaded config

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::watcher::ConfigWatcher;
use crate::config::{loader::load_config, BalancerConfig};
use crate::error::ConfigError;
use crate::lifecycle::shutdown::{shutdown_signal, Shutdown};
use crate::observability::{logging, metrics};
use crate::registry::ClientRegistry;

/// How long background tasks get to exit after shutdown is triggered.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

/// Load `config_path` and run until Ctrl+C or SIGTERM.
pub async fn run(config_path: &Path) -> Result<(), StartupError> {
    let config = load_config(config_path)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        path = ?config_path,
        clients = config.clients.len(),
        "client-balancer starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(ClientRegistry::from_config(&config)?);
    let shutdown = Shutdown::new();
    let mut handles = registry.spawn_background(&shutdown);

    // Keep the watcher alive for the life of the process.
    let _watcher = match start_config_reload(config_path.to_path_buf(), registry.clone(), &shutdown) {
        Ok((watcher, handle)) => {
            handles.push(handle);
            Some(watcher)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            None
        }
    };

    if let Some(handle) = start_admin(&config, registry.clone(), &shutdown).await? {
        handles.push(handle);
    }

    shutdown_signal().await;
    shutdown.trigger();
    registry.cancel_all();

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, futures_util::future::join_all(handles)).await;
    if drained.is_err() {
        tracing::warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Background tasks did not exit in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn start_config_reload(
    path: PathBuf,
    registry: Arc<ClientRegistry>,
    shutdown: &Shutdown,
) -> Result<(notify::RecommendedWatcher, JoinHandle<()>), notify::Error> {
    let (watcher, mut updates) = ConfigWatcher::new(&path);
    let watcher = watcher.run()?;

    let handle = tokio::spawn(apply_config_updates(registry, updates, shutdown.clone()));
    Ok((watcher, handle))
}

/// Apply reloaded configs until shutdown, then wait for tasks of clients added on the way.
async fn apply_config_updates(
    registry: Arc<ClientRegistry>,
    mut updates: mpsc::UnboundedReceiver<BalancerConfig>,
    shutdown: Shutdown,
) {
    let mut shutdown_rx = shutdown.subscribe();
    let mut spawned: Vec<JoinHandle<()>> = Vec::new();
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                for client in registry.apply_config(&config) {
                    spawned.extend(ClientRegistry::spawn_client(&client, &shutdown));
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Config reload task received shutdown signal, exiting loop");
                break;
            }
        }
    }

    if !spawned.is_empty() {
        tracing::debug!(tasks = spawned.len(), "Waiting for tasks of reloaded clients");
        futures_util::future::join_all(spawned).await;
    }
}

async fn start_admin(
    config: &BalancerConfig,
    registry: Arc<ClientRegistry>,
    shutdown: &Shutdown,
) -> Result<Option<JoinHandle<()>>, StartupError> {
    if !config.admin.enabled {
        return Ok(None);
    }

    let address = config.admin.bind_address.clone();
    let listener = TcpListener::bind(&address).await.map_err(|source| StartupError::Bind {
        address: address.clone(),
        source,
    })?;
    tracing::info!(address = %address, "Admin API listening");

    let app = setup_admin_router(AdminState::new(registry, config.admin.api_key.as_str()));
    let mut shutdown_rx = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Admin server error");
        }
        tracing::info!("Admin API stopped");
    });
    Ok(Some(handle))
}

//! Named client registry.
//!
//! # Responsibilities
//! - Build one load balancer, retry handler and server list per configured client
//! - Hand out pre-configured commands by client name
//! - Apply hot-reloaded configuration
//! - Start and stop the per-client background tasks
//!
//! # Design Decisions
//! - Constructed once at startup and passed by reference; no process-wide statics
//! - Reload refreshes server lists and adds clients; it never tears down a live client

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{BalancerConfig, ClientConfig};
use crate::discovery::{PollingServerListUpdater, StaticServerList};
use crate::error::ConfigError;
use crate::execution::{LoadBalancerCommand, LoadBalancerCommandBuilder};
use crate::health::{HealthMonitor, PingUrl};
use crate::lifecycle::Shutdown;
use crate::load_balancer::pool::servers_from_config;
use crate::load_balancer::LoadBalancer;
use crate::resilience::{DefaultRetryHandler, RetryHandler};

/// Everything built for one `[[clients]]` entry.
#[derive(Debug)]
pub struct NamedClient {
    config: ClientConfig,
    load_balancer: Arc<LoadBalancer>,
    retry_handler: Arc<dyn RetryHandler>,
    server_list: Arc<StaticServerList>,
}

impl NamedClient {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let server_list = Arc::new(StaticServerList::from_config(config));
        let load_balancer = Arc::new(LoadBalancer::from_config(config)?);
        Ok(Self {
            config: config.clone(),
            load_balancer,
            retry_handler: Arc::new(DefaultRetryHandler::from_config(&config.retry)),
            server_list,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    pub fn retry_handler(&self) -> &Arc<dyn RetryHandler> {
        &self.retry_handler
    }

    pub fn server_list(&self) -> &Arc<StaticServerList> {
        &self.server_list
    }
}

/// All named clients of the process.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<NamedClient>>,
    cancel: CancellationToken,
}

impl ClientRegistry {
    pub fn from_config(config: &BalancerConfig) -> Result<Self, ConfigError> {
        let registry = Self::default();
        for client in &config.clients {
            let named = NamedClient::from_config(client)?;
            tracing::info!(
                client = %client.name,
                rule = named.load_balancer.rule_name(),
                servers = named.load_balancer.all_servers().len(),
                "Client registered"
            );
            registry.clients.insert(client.name.clone(), Arc::new(named));
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<Arc<NamedClient>> {
        self.clients.get(name).map(|c| c.clone())
    }

    /// Client names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// A command builder wired to the client's load balancer and retry handler.
    ///
    /// Commands built from it are cancelled when the registry shuts down.
    pub fn command(&self, name: &str) -> Option<LoadBalancerCommandBuilder> {
        let client = self.get(name)?;
        Some(
            LoadBalancerCommand::builder()
                .load_balancer(client.load_balancer.clone())
                .retry_handler(client.retry_handler.clone())
                .cancellation_token(self.cancel.child_token()),
        )
    }

    /// Apply a reloaded configuration. Returns the clients that did not exist before.
    pub fn apply_config(&self, config: &BalancerConfig) -> Vec<Arc<NamedClient>> {
        let mut added = Vec::new();
        for client_config in &config.clients {
            if let Some(existing) = self.get(&client_config.name) {
                let servers = servers_from_config(client_config);
                existing.server_list.set(servers.clone());
                existing.load_balancer.update_servers(servers);
                continue;
            }

            match NamedClient::from_config(client_config) {
                Ok(named) => {
                    let named = Arc::new(named);
                    tracing::info!(client = %client_config.name, "Client added on reload");
                    self.clients.insert(client_config.name.clone(), named.clone());
                    added.push(named);
                }
                Err(e) => {
                    tracing::error!(client = %client_config.name, error = %e, "Failed to add client on reload");
                }
            }
        }

        for name in self.names() {
            if !config.clients.iter().any(|c| c.name == name) {
                tracing::warn!(client = %name, "Client removed from config; keeping it until restart");
            }
        }
        added
    }

    /// Start server list updaters and health monitors for every client.
    pub fn spawn_background(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<JoinHandle<()>> = self
            .clients
            .iter()
            .flat_map(|entry| Self::spawn_client(entry.value(), shutdown))
            .collect();

        let cancel = self.cancel.clone();
        let mut rx = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            let _ = rx.recv().await;
            cancel.cancel();
        }));
        handles
    }

    /// Background tasks for a single client.
    pub fn spawn_client(client: &NamedClient, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let config = &client.config;
        let mut handles = Vec::new();

        let updater = PollingServerListUpdater::new(
            client.server_list.clone(),
            client.load_balancer.clone(),
            Duration::from_secs(config.server_list.refresh_interval_secs),
        );
        handles.push(tokio::spawn(updater.run(shutdown.subscribe())));

        if config.health_check.enabled {
            let monitor = HealthMonitor::new(
                client.load_balancer.clone(),
                Arc::new(PingUrl::from_config(&config.health_check)),
                &config.health_check,
            );
            handles.push(tokio::spawn(monitor.run(shutdown.subscribe())));
        } else {
            tracing::info!(client = %config.name, "Active health checks disabled");
        }
        handles
    }

    /// Cancel every command built from this registry.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }
}

//! Periodic server list refresh.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::discovery::server_list::ServerList;
use crate::load_balancer::LoadBalancer;

/// Feeds a [`ServerList`] into a [`LoadBalancer`] on a fixed interval.
pub struct PollingServerListUpdater {
    list: Arc<dyn ServerList>,
    load_balancer: Arc<LoadBalancer>,
    interval: Duration,
}

impl PollingServerListUpdater {
    pub fn new(list: Arc<dyn ServerList>, load_balancer: Arc<LoadBalancer>, interval: Duration) -> Self {
        Self {
            list,
            load_balancer,
            interval,
        }
    }

    /// One refresh cycle.
    pub fn refresh(&self) {
        let servers = self.list.updated_servers();
        tracing::trace!(client = %self.load_balancer.name(), count = servers.len(), "Refreshing server list");
        self.load_balancer.update_servers(servers);
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            client = %self.load_balancer.name(),
            interval_secs = self.interval.as_secs(),
            "Server list updater starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; the pool was seeded at construction.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh(),
                _ = shutdown.recv() => {
                    tracing::info!(client = %self.load_balancer.name(), "Server list updater received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

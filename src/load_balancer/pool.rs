//! Server pool management.
//!
//! # Responsibilities
//! - Hold the current server list as an atomically swapped snapshot
//! - Apply the configured selection rule
//! - Own the stats registry shared by the rule and the command layer
//!
//! # Design Decisions
//! - Readers never lock: every `choose` works on one immutable snapshot
//! - Refreshes keep existing `Arc<Server>` handles so health flags survive

use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CircuitBreakerConfig, ClientConfig, StatsConfig};
use crate::error::{ClientError, ConfigError};
use crate::load_balancer::registry::build_rule;
use crate::load_balancer::{RoutingKey, SelectionContext, SelectionRule, server::Server};
use crate::observability::metrics;
use crate::stats::registry::ZoneSnapshot;
use crate::stats::{now_millis, LoadBalancerStats, ServerStatsView};

/// A named pool of servers plus the rule that picks among them.
#[derive(Debug)]
pub struct LoadBalancer {
    name: String,
    servers: ArcSwap<Vec<Arc<Server>>>,
    rule: Arc<dyn SelectionRule>,
    stats: Arc<LoadBalancerStats>,
    stats_grace: Duration,
}

impl LoadBalancer {
    /// Empty pool with default circuit-breaker and stats settings.
    pub fn new(name: impl Into<String>, rule: Arc<dyn SelectionRule>) -> Self {
        Self::with_config(name, rule, CircuitBreakerConfig::default(), &StatsConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        rule: Arc<dyn SelectionRule>,
        circuit_breaker: CircuitBreakerConfig,
        stats: &StatsConfig,
    ) -> Self {
        let name = name.into();
        let stats_registry = LoadBalancerStats::new(
            name.clone(),
            circuit_breaker,
            stats.response_time_window_size,
        );
        Self {
            name,
            servers: ArcSwap::from_pointee(Vec::new()),
            rule,
            stats: Arc::new(stats_registry),
            stats_grace: Duration::from_secs(stats.stats_grace_period_secs),
        }
    }

    /// Build the pool for one configured client, seeded with its static servers.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let rule = build_rule(&config.rule, config)?;
        let lb = Self::with_config(
            config.name.clone(),
            rule,
            config.circuit_breaker.clone(),
            &config.stats,
        );
        lb.update_servers(servers_from_config(config));
        Ok(lb)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule_name(&self) -> &'static str {
        self.rule.name()
    }

    /// Current snapshot of every server, including those marked down.
    pub fn all_servers(&self) -> Arc<Vec<Arc<Server>>> {
        self.servers.load_full()
    }

    /// Servers that are alive and ready to serve.
    pub fn reachable_servers(&self) -> Vec<Arc<Server>> {
        self.servers
            .load()
            .iter()
            .filter(|s| s.is_available())
            .cloned()
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<Arc<Server>> {
        self.servers.load().iter().find(|s| s.id() == id).cloned()
    }

    /// Replace the server list.
    ///
    /// Servers whose id survives keep their existing handle; new ones start alive
    /// and ready. Stats of departed servers are pruned once idle past the grace period.
    pub fn update_servers(&self, servers: Vec<Server>) {
        let previous = self.servers.rcu(|current| {
            let existing: HashMap<&str, &Arc<Server>> =
                current.iter().map(|s| (s.id(), s)).collect();
            let mut seen = HashSet::new();
            servers
                .iter()
                .filter(|s| seen.insert(s.id().to_string()))
                .map(|s| match existing.get(s.id()) {
                    Some(kept) => Arc::clone(kept),
                    None => Arc::new(s.clone()),
                })
                .collect::<Vec<_>>()
        });

        let current = self.servers.load();
        let live: HashSet<String> = current.iter().map(|s| s.id().to_string()).collect();
        let added = current.iter().filter(|s| !previous.iter().any(|p| p.id() == s.id())).count();
        let removed = previous.iter().filter(|p| !live.contains(p.id())).count();
        if added > 0 || removed > 0 {
            tracing::info!(
                client = %self.name,
                total = current.len(),
                added,
                removed,
                "Server list updated"
            );
        }

        self.stats.prune(&live, self.stats_grace);
        metrics::record_server_list_size(&self.name, current.len());
    }

    /// Append servers not already present.
    pub fn add_servers(&self, servers: Vec<Server>) {
        self.servers.rcu(|current| {
            let mut next = Vec::clone(current);
            for server in &servers {
                if !next.iter().any(|s| s.id() == server.id()) {
                    next.push(Arc::new(server.clone()));
                }
            }
            next
        });
        metrics::record_server_list_size(&self.name, self.servers.load().len());
    }

    /// Mark a server down. Returns false when the id is unknown.
    pub fn mark_down(&self, id: &str) -> bool {
        self.set_alive(id, false)
    }

    /// Mark a server up. Returns false when the id is unknown.
    pub fn mark_up(&self, id: &str) -> bool {
        self.set_alive(id, true)
    }

    fn set_alive(&self, id: &str, alive: bool) -> bool {
        let Some(server) = self.find(id) else {
            return false;
        };
        let was = server.set_alive(alive);
        if was != alive {
            tracing::info!(client = %self.name, server = %id, alive, "Server liveness changed");
        }
        metrics::record_server_health(&self.name, id, alive);
        true
    }

    /// Ask the rule for a server.
    pub fn choose(&self, key: Option<&RoutingKey>) -> Result<Arc<Server>, ClientError> {
        let servers = self.servers.load();
        let ctx = SelectionContext {
            client: &self.name,
            servers: &servers,
            stats: &self.stats,
            now_ms: now_millis(),
        };
        self.rule.choose(&ctx, key).ok_or_else(|| {
            tracing::debug!(client = %self.name, rule = self.rule.name(), total = servers.len(), "No server chosen");
            ClientError::NoServerAvailable {
                client: self.name.clone(),
            }
        })
    }

    pub fn stats(&self) -> &Arc<LoadBalancerStats> {
        &self.stats
    }

    pub fn server_stats(&self, server: &Server) -> ServerStatsView {
        self.stats.single_server_stat(server).view(now_millis())
    }

    pub fn zone_snapshots(&self) -> HashMap<String, ZoneSnapshot> {
        self.stats.zone_snapshots(&self.servers.load(), now_millis())
    }
}

/// Parse a client's configured servers, skipping entries that do not parse.
pub fn servers_from_config(config: &ClientConfig) -> Vec<Server> {
    config
        .servers
        .iter()
        .filter_map(|entry| {
            let server = Server::from_config(entry);
            if server.is_none() {
                tracing::warn!(client = %config.name, address = %entry.address, "Invalid server address");
            }
            server
        })
        .collect()
}

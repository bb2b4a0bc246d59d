//! Stats registry for one load balancer, and zone aggregates.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CircuitBreakerConfig;
use crate::load_balancer::server::Server;
use crate::stats::now_millis;
use crate::stats::server_stats::ServerStats;

/// Aggregate view of one zone, always derived from the live [`ServerStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub zone: String,
    pub instance_count: usize,
    /// Active requests per non-tripped instance; `-1.0` when every instance is tripped.
    pub load_per_server: f64,
    pub circuit_tripped_count: usize,
    pub active_requests_count: u64,
}

impl ZoneSnapshot {
    /// Fraction of instances whose circuit is tripped.
    pub fn tripped_fraction(&self) -> f64 {
        if self.instance_count == 0 {
            0.0
        } else {
            self.circuit_tripped_count as f64 / self.instance_count as f64
        }
    }
}

/// Shared registry of per-server statistics, keyed by server id.
#[derive(Debug)]
pub struct LoadBalancerStats {
    name: String,
    config: Arc<CircuitBreakerConfig>,
    window_size: usize,
    servers: DashMap<String, Arc<ServerStats>>,
}

impl LoadBalancerStats {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, window_size: usize) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            window_size,
            servers: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn circuit_breaker_config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Stats for `server`, created on first reference.
    pub fn single_server_stat(&self, server: &Server) -> Arc<ServerStats> {
        let stats = self
            .servers
            .entry(server.id().to_string())
            .or_insert_with(|| {
                Arc::new(ServerStats::new(
                    server.id(),
                    self.config.clone(),
                    self.window_size,
                ))
            })
            .clone();
        stats.touch(now_millis());
        stats
    }

    /// Stats for a server id, if any have been recorded.
    pub fn get(&self, server_id: &str) -> Option<Arc<ServerStats>> {
        self.servers.get(server_id).map(|s| s.clone())
    }

    pub fn server_ids(&self) -> Vec<String> {
        self.servers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn is_circuit_breaker_tripped(&self, server: &Server, now_ms: u64) -> bool {
        self.get(server.id())
            .map(|s| s.is_circuit_breaker_tripped_at(now_ms))
            .unwrap_or(false)
    }

    pub fn active_requests_count(&self, server: &Server, now_ms: u64) -> u64 {
        self.get(server.id())
            .map(|s| s.active_requests_count(now_ms))
            .unwrap_or(0)
    }

    /// Aggregate the given servers as one zone.
    pub fn zone_snapshot(&self, zone: &str, servers: &[Arc<Server>], now_ms: u64) -> ZoneSnapshot {
        let instance_count = servers.len();
        let mut circuit_tripped_count = 0;
        let mut active_on_available = 0u64;
        let mut active_requests_count = 0u64;

        for server in servers {
            let stats = self.single_server_stat(server);
            let active = stats.active_requests_count(now_ms);
            if stats.is_circuit_breaker_tripped_at(now_ms) {
                circuit_tripped_count += 1;
            } else {
                active_on_available += active;
            }
            active_requests_count += active;
        }

        let load_per_server = if circuit_tripped_count == instance_count {
            if instance_count > 0 {
                -1.0
            } else {
                0.0
            }
        } else {
            active_on_available as f64 / (instance_count - circuit_tripped_count) as f64
        };

        ZoneSnapshot {
            zone: zone.to_string(),
            instance_count,
            load_per_server,
            circuit_tripped_count,
            active_requests_count,
        }
    }

    /// Snapshots for every zone present in `servers`.
    pub fn zone_snapshots(&self, servers: &[Arc<Server>], now_ms: u64) -> HashMap<String, ZoneSnapshot> {
        group_by_zone(servers)
            .into_iter()
            .map(|(zone, members)| {
                let snapshot = self.zone_snapshot(&zone, &members, now_ms);
                (zone, snapshot)
            })
            .collect()
    }

    /// Drop stats for servers no longer in the pool once idle past `grace`.
    pub fn prune(&self, live_ids: &HashSet<String>, grace: Duration) -> usize {
        let now = now_millis();
        let grace_ms = grace.as_millis() as u64;
        let before = self.servers.len();
        self.servers.retain(|id, stats| {
            live_ids.contains(id) || now.saturating_sub(stats.last_accessed_ms()) < grace_ms
        });
        let removed = before.saturating_sub(self.servers.len());
        if removed > 0 {
            tracing::debug!(client = %self.name, removed, "Pruned stats of departed servers");
        }
        removed
    }
}

/// Group servers by zone, preserving pool order within each zone.
pub fn group_by_zone(servers: &[Arc<Server>]) -> HashMap<String, Vec<Arc<Server>>> {
    let mut zones: HashMap<String, Vec<Arc<Server>>> = HashMap::new();
    for server in servers {
        zones
            .entry(server.zone().to_string())
            .or_default()
            .push(server.clone());
    }
    zones
}

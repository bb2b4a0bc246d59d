//! Server predicates and predicate-filtered selection.
//!
//! # Responsibilities
//! - Decide per server whether it is eligible (availability, zone)
//! - Combine predicates with AND semantics and ordered fallbacks
//! - Round-robin over whatever survives filtering
//!
//! # Design Decisions
//! - A fallback kicks in when too few servers survive, so filtering degrades
//!   instead of starving the caller
//! - Zone availability is computed once per filter pass, not per server

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::{AvailabilityConfig, ZoneConfig};
use crate::load_balancer::round_robin::RoundRobinRule;
use crate::load_balancer::zone::available_zones;
use crate::load_balancer::{RoutingKey, SelectionContext, SelectionRule, server::Server};
use crate::stats::registry::group_by_zone;

/// Trait for server eligibility checks.
pub trait ServerPredicate: Send + Sync + fmt::Debug {
    /// Returns true if the server may be selected.
    fn apply(&self, server: &Server, ctx: &SelectionContext<'_>, key: Option<&RoutingKey>) -> bool;

    /// Filter a candidate list.
    fn filter(
        &self,
        servers: &[Arc<Server>],
        ctx: &SelectionContext<'_>,
        key: Option<&RoutingKey>,
    ) -> Vec<Arc<Server>> {
        servers
            .iter()
            .filter(|s| self.apply(s, ctx, key))
            .cloned()
            .collect()
    }
}

/// Accepts every server.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysTrue;

impl ServerPredicate for AlwaysTrue {
    fn apply(&self, _: &Server, _: &SelectionContext<'_>, _: Option<&RoutingKey>) -> bool {
        true
    }
}

/// Skips circuit-tripped servers and servers at their active-request limit.
#[derive(Debug, Clone)]
pub struct AvailabilityPredicate {
    circuit_breaker_filtering: bool,
    /// 0 = unlimited.
    active_connections_limit: u64,
}

impl AvailabilityPredicate {
    pub fn new(config: &AvailabilityConfig) -> Self {
        Self {
            circuit_breaker_filtering: config.circuit_breaker_filtering,
            active_connections_limit: config.active_connections_limit,
        }
    }
}

impl Default for AvailabilityPredicate {
    fn default() -> Self {
        Self::new(&AvailabilityConfig::default())
    }
}

impl ServerPredicate for AvailabilityPredicate {
    fn apply(&self, server: &Server, ctx: &SelectionContext<'_>, _: Option<&RoutingKey>) -> bool {
        let Some(stats) = ctx.stats.get(server.id()) else {
            return true;
        };
        if self.circuit_breaker_filtering && stats.is_circuit_breaker_tripped_at(ctx.now_ms) {
            return false;
        }
        if self.active_connections_limit > 0
            && stats.active_requests_count(ctx.now_ms) >= self.active_connections_limit
        {
            return false;
        }
        true
    }
}

/// Keeps servers whose zone is currently considered available.
#[derive(Debug, Clone)]
pub struct ZoneAvoidancePredicate {
    config: ZoneConfig,
}

impl ZoneAvoidancePredicate {
    pub fn new(config: ZoneConfig) -> Self {
        Self { config }
    }

    fn zones(&self, ctx: &SelectionContext<'_>) -> Option<BTreeSet<String>> {
        if !self.config.enabled {
            return None;
        }
        let snapshots = group_by_zone(ctx.servers)
            .into_iter()
            .map(|(zone, members)| {
                let snapshot = ctx.stats.zone_snapshot(&zone, &members, ctx.now_ms);
                (zone, snapshot)
            })
            .collect();
        Some(available_zones(&snapshots, &self.config))
    }
}

impl ServerPredicate for ZoneAvoidancePredicate {
    fn apply(&self, server: &Server, ctx: &SelectionContext<'_>, _: Option<&RoutingKey>) -> bool {
        match self.zones(ctx) {
            Some(zones) => zones.contains(server.zone()),
            None => true,
        }
    }

    fn filter(
        &self,
        servers: &[Arc<Server>],
        ctx: &SelectionContext<'_>,
        _: Option<&RoutingKey>,
    ) -> Vec<Arc<Server>> {
        match self.zones(ctx) {
            Some(zones) => servers
                .iter()
                .filter(|s| zones.contains(s.zone()))
                .cloned()
                .collect(),
            None => servers.to_vec(),
        }
    }
}

/// Combines multiple predicates with AND semantics.
#[derive(Debug)]
pub struct AndPredicate {
    predicates: Vec<Arc<dyn ServerPredicate>>,
}

impl AndPredicate {
    pub fn new(predicates: Vec<Arc<dyn ServerPredicate>>) -> Self {
        Self { predicates }
    }
}

impl ServerPredicate for AndPredicate {
    fn apply(&self, server: &Server, ctx: &SelectionContext<'_>, key: Option<&RoutingKey>) -> bool {
        // All predicates must pass (AND)
        self.predicates.iter().all(|p| p.apply(server, ctx, key))
    }

    fn filter(
        &self,
        servers: &[Arc<Server>],
        ctx: &SelectionContext<'_>,
        key: Option<&RoutingKey>,
    ) -> Vec<Arc<Server>> {
        let mut remaining = servers.to_vec();
        for predicate in &self.predicates {
            if remaining.is_empty() {
                break;
            }
            remaining = predicate.filter(&remaining, ctx, key);
        }
        remaining
    }
}

/// A primary predicate with ordered fallbacks.
///
/// When the primary leaves fewer than `min_filtered_servers` servers, or fewer
/// than `min_filtered_percentage` of the input, the next fallback is applied to
/// the original list instead.
#[derive(Debug)]
pub struct CompositePredicate {
    primary: Arc<dyn ServerPredicate>,
    fallbacks: Vec<Arc<dyn ServerPredicate>>,
    min_filtered_servers: usize,
    min_filtered_percentage: f64,
}

impl CompositePredicate {
    pub fn new(primary: Arc<dyn ServerPredicate>) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
            min_filtered_servers: 1,
            min_filtered_percentage: 0.0,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ServerPredicate>) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn with_min_filtered_servers(mut self, min: usize) -> Self {
        self.min_filtered_servers = min;
        self
    }

    pub fn with_min_filtered_percentage(mut self, percentage: f64) -> Self {
        self.min_filtered_percentage = percentage;
        self
    }

    fn enough(&self, filtered: usize, total: usize) -> bool {
        filtered >= self.min_filtered_servers
            && filtered as f64 >= total as f64 * self.min_filtered_percentage
    }

    /// Servers passing the first predicate in the chain that leaves enough of them.
    pub fn eligible_servers(
        &self,
        servers: &[Arc<Server>],
        ctx: &SelectionContext<'_>,
        key: Option<&RoutingKey>,
    ) -> Vec<Arc<Server>> {
        let mut result = self.primary.filter(servers, ctx, key);
        for fallback in &self.fallbacks {
            if self.enough(result.len(), servers.len()) {
                break;
            }
            tracing::debug!(
                client = %ctx.client,
                filtered = result.len(),
                total = servers.len(),
                "Too few servers after filtering, applying fallback predicate"
            );
            result = fallback.filter(servers, ctx, key);
        }
        result
    }
}

/// Filter reachable servers through a [`CompositePredicate`], then round-robin.
#[derive(Debug)]
pub struct PredicateBasedRule {
    name: &'static str,
    predicate: CompositePredicate,
    round_robin: RoundRobinRule,
}

impl PredicateBasedRule {
    pub fn new(name: &'static str, predicate: CompositePredicate) -> Self {
        Self {
            name,
            predicate,
            round_robin: RoundRobinRule::new(),
        }
    }

    /// Availability filtering: skip tripped/saturated servers, else accept any.
    pub fn availability_filtering(config: &AvailabilityConfig) -> Self {
        let predicate = CompositePredicate::new(Arc::new(AvailabilityPredicate::new(config)))
            .with_fallback(Arc::new(AlwaysTrue));
        Self::new("availability_filtering", predicate)
    }

    /// Zone avoidance layered over availability filtering.
    pub fn zone_avoidance(zone: &ZoneConfig, availability: &AvailabilityConfig) -> Self {
        let availability: Arc<dyn ServerPredicate> = Arc::new(AvailabilityPredicate::new(availability));
        let both = AndPredicate::new(vec![
            Arc::new(ZoneAvoidancePredicate::new(zone.clone())),
            availability.clone(),
        ]);
        let predicate = CompositePredicate::new(Arc::new(both))
            .with_fallback(availability)
            .with_fallback(Arc::new(AlwaysTrue));
        Self::new("zone_avoidance", predicate)
    }
}

impl SelectionRule for PredicateBasedRule {
    fn choose(&self, ctx: &SelectionContext<'_>, key: Option<&RoutingKey>) -> Option<Arc<Server>> {
        let reachable = ctx.reachable();
        let eligible = self.predicate.eligible_servers(&reachable, ctx, key);
        if eligible.is_empty() {
            tracing::warn!(client = %ctx.client, rule = self.name, "No eligible servers after filtering");
            return None;
        }
        let index = self.round_robin.increment_and_get_modulo(eligible.len());
        Some(eligible[index].clone())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

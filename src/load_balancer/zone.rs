//! Zone-aware selection.
//!
//! # Responsibilities
//! - Decide which zones are currently usable from their snapshots
//! - Pick one zone with probability proportional to its instance count
//! - Delegate to a per-zone inner rule restricted to that zone's servers
//!
//! # Design Decisions
//! - Exclusion never removes every zone
//! - The zone rule wraps an inner rule instead of extending one

use dashmap::DashMap;
use rand::Rng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::config::ZoneConfig;
use crate::load_balancer::round_robin::RoundRobinRule;
use crate::load_balancer::{RoutingKey, SelectionContext, SelectionRule, server::Server};
use crate::stats::registry::{group_by_zone, ZoneSnapshot};

/// Zones that remain candidates after blackout and load exclusion.
///
/// Zones whose tripped fraction reaches `triggering_blackout_percentage` (or whose
/// every instance is tripped) are dropped, then zones whose load reaches
/// `triggering_load_per_server`. A step that would drop every zone is skipped.
pub fn available_zones(
    snapshots: &HashMap<String, ZoneSnapshot>,
    config: &ZoneConfig,
) -> BTreeSet<String> {
    let populated: BTreeSet<String> = snapshots
        .values()
        .filter(|s| s.instance_count > 0)
        .map(|s| s.zone.clone())
        .collect();
    if populated.len() <= 1 {
        return populated;
    }

    let healthy: BTreeSet<String> = populated
        .iter()
        .filter(|zone| {
            let s = &snapshots[*zone];
            s.load_per_server >= 0.0 && s.tripped_fraction() < config.triggering_blackout_percentage
        })
        .cloned()
        .collect();
    if healthy.is_empty() {
        tracing::debug!(zones = populated.len(), "Every zone is blacked out, excluding none");
        return populated;
    }

    let unloaded: BTreeSet<String> = healthy
        .iter()
        .filter(|zone| snapshots[*zone].load_per_server < config.triggering_load_per_server)
        .cloned()
        .collect();
    if unloaded.is_empty() {
        return healthy;
    }
    unloaded
}

/// Pick one of `zones`, weighted by instance count.
pub fn choose_zone_weighted<R: Rng + ?Sized>(
    snapshots: &HashMap<String, ZoneSnapshot>,
    zones: &BTreeSet<String>,
    rng: &mut R,
) -> Option<String> {
    let weighted: Vec<(&String, usize)> = zones
        .iter()
        .filter_map(|z| snapshots.get(z).map(|s| (z, s.instance_count)))
        .filter(|(_, n)| *n > 0)
        .collect();
    let total: usize = weighted.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return None;
    }

    let mut pick = rng.gen_range(0..total);
    for (zone, count) in weighted {
        if pick < count {
            return Some(zone.clone());
        }
        pick -= count;
    }
    None
}

/// Builds a fresh inner rule for one zone.
pub type RuleFactory = Arc<dyn Fn() -> Arc<dyn SelectionRule> + Send + Sync>;

/// Picks a zone, then delegates to that zone's own inner rule.
pub struct ZoneAwareRule {
    config: ZoneConfig,
    inner_factory: RuleFactory,
    zone_rules: DashMap<String, Arc<dyn SelectionRule>>,
    whole_pool: Arc<dyn SelectionRule>,
}

impl ZoneAwareRule {
    /// Zone-aware rule with round robin inside each zone.
    pub fn new(config: ZoneConfig) -> Self {
        Self::with_inner(config, Arc::new(|| Arc::new(RoundRobinRule::new()) as Arc<dyn SelectionRule>))
    }

    pub fn with_inner(config: ZoneConfig, inner_factory: RuleFactory) -> Self {
        let whole_pool = inner_factory();
        Self {
            config,
            inner_factory,
            zone_rules: DashMap::new(),
            whole_pool,
        }
    }

    fn zone_rule(&self, zone: &str) -> Arc<dyn SelectionRule> {
        self.zone_rules
            .entry(zone.to_string())
            .or_insert_with(|| (self.inner_factory)())
            .clone()
    }

    /// Drop inner rules of zones no longer present in the pool.
    fn prune_zone_rules(&self, servers: &[Arc<Server>]) {
        let known: HashSet<&str> = servers.iter().map(|s| s.zone()).collect();
        let stale = self.zone_rules.iter().any(|entry| !known.contains(entry.key().as_str()));
        if stale {
            self.zone_rules.retain(|zone, _| known.contains(zone.as_str()));
        }
    }
}

impl fmt::Debug for ZoneAwareRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneAwareRule")
            .field("config", &self.config)
            .field("zones", &self.zone_rules.len())
            .finish()
    }
}

impl SelectionRule for ZoneAwareRule {
    fn choose(&self, ctx: &SelectionContext<'_>, key: Option<&RoutingKey>) -> Option<Arc<Server>> {
        if !self.config.enabled {
            return self.whole_pool.choose(ctx, key);
        }

        self.prune_zone_rules(ctx.servers);

        // Down servers carry no weight; a zone with none reachable is not a candidate.
        let reachable = ctx.reachable();
        let zones = group_by_zone(&reachable);
        if zones.len() <= 1 {
            return self.whole_pool.choose(ctx, key);
        }

        let snapshots: HashMap<String, ZoneSnapshot> = zones
            .iter()
            .map(|(zone, members)| (zone.clone(), ctx.stats.zone_snapshot(zone, members, ctx.now_ms)))
            .collect();
        let mut available = available_zones(&snapshots, &self.config);
        let mut rng = rand::thread_rng();

        while let Some(zone) = choose_zone_weighted(&snapshots, &available, &mut rng) {
            let picked = self.zone_rule(&zone).choose(&ctx.with_servers(&zones[&zone]), key);
            if picked.is_some() {
                tracing::trace!(client = %ctx.client, zone = %zone, "Selected zone");
                return picked;
            }
            tracing::debug!(client = %ctx.client, zone = %zone, "Zone rule found no server, trying remaining zones");
            available.remove(&zone);
        }

        tracing::debug!(client = %ctx.client, "No available zone produced a server, using whole pool");
        self.whole_pool.choose(ctx, key)
    }

    fn name(&self) -> &'static str {
        "zone_aware"
    }
}

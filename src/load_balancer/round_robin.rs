//! Round-robin selection rule.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::{RoutingKey, SelectionContext, SelectionRule, server::Server};

/// Upper bound on indices probed per `choose` call.
pub const MAX_ATTEMPTS: usize = 10;

/// Round-robin selector.
///
/// The cyclic counter indexes into *all* servers, not only reachable ones, so
/// positions stay stable while liveness flaps. Unavailable picks are skipped.
#[derive(Debug, Default)]
pub struct RoundRobinRule {
    counter: AtomicUsize,
}

impl RoundRobinRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter and return its new value modulo `modulo`.
    pub fn increment_and_get_modulo(&self, modulo: usize) -> usize {
        let mut current = self.counter.load(Ordering::Relaxed);
        loop {
            let next = (current + 1) % modulo;
            match self.counter.compare_exchange_weak(
                current, next, Ordering::Relaxed, Ordering::Relaxed
            ) {
                Ok(_) => return next,
                Err(x) => current = x,
            }
        }
    }
}

impl SelectionRule for RoundRobinRule {
    fn choose(&self, ctx: &SelectionContext<'_>, _key: Option<&RoutingKey>) -> Option<Arc<Server>> {
        let servers = ctx.servers;
        if servers.is_empty() || !servers.iter().any(|s| s.is_available()) {
            tracing::warn!(client = %ctx.client, server_count = servers.len(), "No up servers available");
            return None;
        }

        for _ in 0..MAX_ATTEMPTS {
            let index = self.increment_and_get_modulo(servers.len());
            let server = &servers[index];
            if server.is_available() {
                return Some(server.clone());
            }
        }

        tracing::warn!(
            client = %ctx.client,
            attempts = MAX_ATTEMPTS,
            "No available alive servers after round-robin attempts"
        );
        None
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use crate::stats::LoadBalancerStats;
    use std::collections::HashMap;

    fn pool(n: usize) -> Vec<Arc<Server>> {
        (0..n).map(|i| Arc::new(Server::new("127.0.0.1", 8080 + i as u16))).collect()
    }

    fn ctx<'a>(servers: &'a [Arc<Server>], stats: &'a LoadBalancerStats) -> SelectionContext<'a> {
        SelectionContext { client: "test", servers, stats, now_ms: 0 }
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobinRule::new();
        let stats = LoadBalancerStats::new("test", CircuitBreakerConfig::default(), 10);
        let servers = pool(3);
        let ctx = ctx(&servers, &stats);

        let s1 = lb.choose(&ctx, None).unwrap();
        let s2 = lb.choose(&ctx, None).unwrap();
        let s3 = lb.choose(&ctx, None).unwrap();
        let s4 = lb.choose(&ctx, None).unwrap();
        assert_eq!(s1.port() + 1, s2.port());
        assert_eq!((s2.port() - 8080 + 1) % 3, s3.port() - 8080);
        assert_eq!(s1, s4);
    }

    #[test]
    fn test_even_distribution() {
        let lb = RoundRobinRule::new();
        let stats = LoadBalancerStats::new("test", CircuitBreakerConfig::default(), 10);
        let servers = pool(4);
        let ctx = ctx(&servers, &stats);

        let mut hits: HashMap<String, usize> = HashMap::new();
        for _ in 0..4000 {
            let s = lb.choose(&ctx, None).unwrap();
            *hits.entry(s.id().to_string()).or_default() += 1;
        }
        assert_eq!(hits.len(), 4);
        assert!(hits.values().all(|&n| n == 1000));
    }

    #[test]
    fn test_skips_down_servers() {
        let lb = RoundRobinRule::new();
        let stats = LoadBalancerStats::new("test", CircuitBreakerConfig::default(), 10);
        let servers = pool(3);
        servers[1].set_alive(false);
        let ctx = ctx(&servers, &stats);

        for _ in 0..30 {
            assert_ne!(lb.choose(&ctx, None).unwrap(), servers[1]);
        }
    }

    #[test]
    fn test_gives_up_within_attempt_cap() {
        let lb = RoundRobinRule::new();
        let stats = LoadBalancerStats::new("test", CircuitBreakerConfig::default(), 10);
        // One ready server hidden among many that are not.
        let servers = pool(50);
        for s in &servers[..49] {
            s.set_ready_to_serve(false);
        }
        let ctx = ctx(&servers, &stats);

        assert!(lb.choose(&ctx, None).is_none());
        assert!(lb.counter.load(Ordering::Relaxed) <= MAX_ATTEMPTS);
    }
}

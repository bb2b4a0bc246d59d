//! Best-available selection rule.

use std::sync::Arc;
use crate::load_balancer::{
    RoutingKey, SelectionContext, SelectionRule,
    round_robin::RoundRobinRule,
    server::Server,
};

/// Selects the reachable, non-tripped server with the fewest active requests.
/// Falls back to round robin when every candidate is tripped.
#[derive(Debug, Default)]
pub struct BestAvailableRule {
    fallback: RoundRobinRule,
}

impl BestAvailableRule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionRule for BestAvailableRule {
    fn choose(&self, ctx: &SelectionContext<'_>, key: Option<&RoutingKey>) -> Option<Arc<Server>> {
        // In case of tie, the first one is selected (stability)
        let best = ctx
            .servers
            .iter()
            .filter(|s| s.is_available())
            .filter_map(|s| {
                let stats = ctx.stats.single_server_stat(s);
                if stats.is_circuit_breaker_tripped_at(ctx.now_ms) {
                    None
                } else {
                    Some((stats.active_requests_count(ctx.now_ms), s))
                }
            })
            .min_by_key(|(active, _)| *active)
            .map(|(_, s)| s.clone());

        best.or_else(|| self.fallback.choose(ctx, key))
    }

    fn name(&self) -> &'static str {
        "best_available"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use crate::stats::{now_millis, LoadBalancerStats};

    #[test]
    fn test_best_available() {
        let lb = BestAvailableRule::new();
        let stats = LoadBalancerStats::new("t", CircuitBreakerConfig::default(), 10);
        let b1 = Arc::new(Server::new("127.0.0.1", 8080));
        let b2 = Arc::new(Server::new("127.0.0.1", 8081));
        let servers = vec![b1.clone(), b2.clone()];
        let ctx = SelectionContext { client: "t", servers: &servers, stats: &stats, now_ms: now_millis() };

        // artificially increase active requests on b1
        stats.single_server_stat(&b1).increment_active_requests();

        // Should pick b2 (0 active)
        assert_eq!(lb.choose(&ctx, None).unwrap(), b2);

        // now b2 has 2, b1 has 1
        stats.single_server_stat(&b2).increment_active_requests();
        stats.single_server_stat(&b2).increment_active_requests();
        assert_eq!(lb.choose(&ctx, None).unwrap(), b1);
    }

    #[test]
    fn test_skips_tripped_and_falls_back() {
        let lb = BestAvailableRule::new();
        let stats = LoadBalancerStats::new("t", CircuitBreakerConfig::default(), 10);
        let b1 = Arc::new(Server::new("127.0.0.1", 8080));
        let b2 = Arc::new(Server::new("127.0.0.1", 8081));
        let servers = vec![b1.clone(), b2.clone()];

        for _ in 0..3 {
            stats.single_server_stat(&b1).note_successive_failure();
        }
        stats.single_server_stat(&b2).increment_active_requests();
        let ctx = SelectionContext { client: "t", servers: &servers, stats: &stats, now_ms: now_millis() };
        assert_eq!(lb.choose(&ctx, None).unwrap(), b2);

        for _ in 0..3 {
            stats.single_server_stat(&b2).note_successive_failure();
        }
        let ctx = SelectionContext { client: "t", servers: &servers, stats: &stats, now_ms: now_millis() };
        assert!(lb.choose(&ctx, None).is_some());
    }
}

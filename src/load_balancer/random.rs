//! Uniform random selection rule.

use std::sync::Arc;

use crate::load_balancer::{RoutingKey, SelectionContext, SelectionRule, server::Server};

/// Picks uniformly among reachable servers.
#[derive(Debug, Default)]
pub struct RandomRule;

impl RandomRule {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionRule for RandomRule {
    fn choose(&self, ctx: &SelectionContext<'_>, _key: Option<&RoutingKey>) -> Option<Arc<Server>> {
        let reachable = ctx.reachable();
        if reachable.is_empty() {
            tracing::warn!(client = %ctx.client, "No up servers available");
            return None;
        }
        Some(reachable[fastrand::usize(..reachable.len())].clone())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use crate::stats::LoadBalancerStats;

    #[test]
    fn test_random_only_returns_reachable() {
        let stats = LoadBalancerStats::new("t", CircuitBreakerConfig::default(), 10);
        let servers: Vec<_> = (0..5).map(|i| Arc::new(Server::new("h", i))).collect();
        servers[0].set_alive(false);
        servers[3].set_alive(false);
        let ctx = SelectionContext { client: "t", servers: &servers, stats: &stats, now_ms: 0 };

        let rule = RandomRule::new();
        for _ in 0..200 {
            let s = rule.choose(&ctx, None).unwrap();
            assert!(s.is_alive());
        }

        for s in &servers {
            s.set_alive(false);
        }
        assert!(rule.choose(&ctx, None).is_none());
    }
}

//! Rule lookup by name.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::load_balancer::best_available::BestAvailableRule;
use crate::load_balancer::predicate::PredicateBasedRule;
use crate::load_balancer::random::RandomRule;
use crate::load_balancer::round_robin::RoundRobinRule;
use crate::load_balancer::zone::ZoneAwareRule;
use crate::load_balancer::SelectionRule;

type Constructor = fn(&ClientConfig) -> Arc<dyn SelectionRule>;

const RULES: &[(&str, Constructor)] = &[
    ("round_robin", round_robin),
    ("random", random),
    ("best_available", best_available),
    ("availability_filtering", availability_filtering),
    ("zone_avoidance", zone_avoidance),
    ("zone_aware", zone_aware),
];

fn round_robin(_: &ClientConfig) -> Arc<dyn SelectionRule> {
    Arc::new(RoundRobinRule::new())
}

fn random(_: &ClientConfig) -> Arc<dyn SelectionRule> {
    Arc::new(RandomRule::new())
}

fn best_available(_: &ClientConfig) -> Arc<dyn SelectionRule> {
    Arc::new(BestAvailableRule::new())
}

fn availability_filtering(config: &ClientConfig) -> Arc<dyn SelectionRule> {
    Arc::new(PredicateBasedRule::availability_filtering(&config.availability))
}

fn zone_avoidance(config: &ClientConfig) -> Arc<dyn SelectionRule> {
    Arc::new(PredicateBasedRule::zone_avoidance(&config.zone, &config.availability))
}

fn zone_aware(config: &ClientConfig) -> Arc<dyn SelectionRule> {
    Arc::new(ZoneAwareRule::new(config.zone.clone()))
}

/// Registered rule names.
pub fn rule_names() -> impl Iterator<Item = &'static str> {
    RULES.iter().map(|(name, _)| *name)
}

pub fn is_known_rule(name: &str) -> bool {
    RULES.iter().any(|(n, _)| *n == name)
}

/// Build the rule named `name` for a client.
pub fn build_rule(name: &str, config: &ClientConfig) -> Result<Arc<dyn SelectionRule>, ConfigError> {
    RULES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, build)| build(config))
        .ok_or_else(|| ConfigError::UnknownRule(name.to_string()))
}

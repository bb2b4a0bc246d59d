//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check client names are present and unique
//! - Validate server addresses and rule names
//! - Validate value ranges (fractions, factors, intervals)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::{BalancerConfig, ClientConfig};
use crate::load_balancer::registry::is_known_rule;
use crate::load_balancer::server::Server;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("client name must not be empty")]
    EmptyClientName,

    #[error("duplicate client name '{0}'")]
    DuplicateClient(String),

    #[error("client '{client}': invalid server address '{address}'")]
    InvalidServer { client: String, address: String },

    #[error("client '{client}': unknown rule '{rule}'")]
    UnknownRule { client: String, rule: String },

    #[error("client '{client}': {field} must be in (0, 1], got {value}")]
    FractionOutOfRange {
        client: String,
        field: &'static str,
        value: f64,
    },

    #[error("client '{client}': {field} must be greater than zero")]
    Zero { client: String, field: &'static str },

    #[error("client '{client}': circuit_trip_max_timeout_secs ({max}) is below circuit_trip_timeout_factor_secs ({factor})")]
    MaxBelowFactor { client: String, max: u64, factor: u64 },
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for client in &config.clients {
        if client.name.trim().is_empty() {
            errors.push(ValidationError::EmptyClientName);
        } else if !seen.insert(client.name.as_str()) {
            errors.push(ValidationError::DuplicateClient(client.name.clone()));
        }
        validate_client(client, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_client(client: &ClientConfig, errors: &mut Vec<ValidationError>) {
    let name = &client.name;

    for server in &client.servers {
        if Server::parse(&server.address).is_none() {
            errors.push(ValidationError::InvalidServer {
                client: name.clone(),
                address: server.address.clone(),
            });
        }
    }

    if !is_known_rule(&client.rule) {
        errors.push(ValidationError::UnknownRule {
            client: name.clone(),
            rule: client.rule.clone(),
        });
    }

    let blackout = client.zone.triggering_blackout_percentage;
    if !(blackout > 0.0 && blackout <= 1.0) {
        errors.push(ValidationError::FractionOutOfRange {
            client: name.clone(),
            field: "triggering_blackout_percentage",
            value: blackout,
        });
    }

    if !(client.zone.triggering_load_per_server > 0.0) {
        errors.push(ValidationError::Zero {
            client: name.clone(),
            field: "triggering_load_per_server",
        });
    }

    let cb = &client.circuit_breaker;
    let positive = [
        ("connection_failure_threshold", cb.connection_failure_threshold as u64),
        ("circuit_trip_timeout_factor_secs", cb.circuit_trip_timeout_factor_secs),
        ("active_requests_count_timeout_secs", cb.active_requests_count_timeout_secs),
        ("refresh_interval_secs", client.server_list.refresh_interval_secs),
        ("response_time_window_size", client.stats.response_time_window_size as u64),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero {
                client: name.clone(),
                field,
            });
        }
    }

    if cb.circuit_trip_max_timeout_secs < cb.circuit_trip_timeout_factor_secs {
        errors.push(ValidationError::MaxBelowFactor {
            client: name.clone(),
            max: cb.circuit_trip_max_timeout_secs,
            factor: cb.circuit_trip_timeout_factor_secs,
        });
    }

    if client.health_check.enabled {
        if client.health_check.interval_secs == 0 {
            errors.push(ValidationError::Zero {
                client: name.clone(),
                field: "health_check.interval_secs",
            });
        }
        if client.health_check.timeout_secs == 0 {
            errors.push(ValidationError::Zero {
                client: name.clone(),
                field: "health_check.timeout_secs",
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServerConfig;

    fn client(name: &str) -> ClientConfig {
        ClientConfig {
            name: name.into(),
            servers: vec![ServerConfig::new("127.0.0.1:8080")],
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_default_client_is_valid() {
        let mut config = BalancerConfig::default();
        config.clients.push(client("users"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut bad = client("users");
        bad.rule = "weighted_magic".into();
        bad.servers.push(ServerConfig::new("not an address"));
        bad.zone.triggering_blackout_percentage = 1.5;
        bad.circuit_breaker.circuit_trip_max_timeout_secs = 5;

        let mut config = BalancerConfig::default();
        config.clients.push(bad);
        config.clients.push(client("users"));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::DuplicateClient("users".into())));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownRule { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidServer { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MaxBelowFactor { .. })));
    }
}

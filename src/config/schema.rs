//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Named load-balanced clients.
    pub clients: Vec<ClientConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// One named client: a server pool, a selection rule and its policies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client identifier for logging/metrics.
    pub name: String,

    /// Selection rule name (see `load_balancer::registry`).
    pub rule: String,

    /// Static server list.
    pub servers: Vec<ServerConfig>,

    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub zone: ZoneConfig,
    pub availability: AvailabilityConfig,
    pub stats: StatsConfig,
    pub server_list: ServerListConfig,
    pub health_check: HealthCheckConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            rule: "round_robin".to_string(),
            servers: Vec::new(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            zone: ZoneConfig::default(),
            availability: AvailabilityConfig::default(),
            stats: StatsConfig::default(),
            server_list: ServerListConfig::default(),
            health_check: HealthCheckConfig::default(),
        }
    }
}

/// Server entry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// `host:port` or a URL such as `http://host:port`.
    pub address: String,

    /// Availability zone (default: "UNKNOWN").
    #[serde(default)]
    pub zone: Option<String>,
}

impl ServerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            zone: None,
        }
    }

    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }
}

/// Retry budgets.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries on the same server after the first attempt.
    pub max_retries_on_same_server: u32,

    /// Additional servers to try after the first one.
    pub max_retries_on_next_server: u32,

    /// Bypass error classification and retry everything.
    pub retry_on_all_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries_on_same_server: 0,
            max_retries_on_next_server: 1,
            retry_on_all_errors: false,
        }
    }
}

/// Per-server circuit breaker and active-count settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Successive connection failures before blackout begins.
    pub connection_failure_threshold: u32,

    /// Blackout base unit in seconds.
    pub circuit_trip_timeout_factor_secs: u64,

    /// Blackout ceiling in seconds.
    pub circuit_trip_max_timeout_secs: u64,

    /// Active request counts idle longer than this read as zero.
    pub active_requests_count_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            connection_failure_threshold: 3,
            circuit_trip_timeout_factor_secs: 10,
            circuit_trip_max_timeout_secs: 30,
            active_requests_count_timeout_secs: 600,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn active_requests_count_timeout(&self) -> Duration {
        Duration::from_secs(self.active_requests_count_timeout_secs)
    }
}

/// Zone-aware selection thresholds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ZoneConfig {
    /// Disable to treat the pool as a single zone.
    pub enabled: bool,

    /// Active requests per available instance that flags a zone as overloaded.
    pub triggering_load_per_server: f64,

    /// Fraction of tripped instances that flags a zone as unavailable.
    pub triggering_blackout_percentage: f64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            triggering_load_per_server: 0.2,
            triggering_blackout_percentage: 0.99999,
        }
    }
}

/// Availability filtering.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AvailabilityConfig {
    /// Skip circuit-tripped servers.
    pub circuit_breaker_filtering: bool,

    /// Skip servers with at least this many active requests (0 = unlimited).
    pub active_connections_limit: u64,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_filtering: true,
            active_connections_limit: 0,
        }
    }
}

/// Statistics retention.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    /// Samples kept for percentile queries.
    pub response_time_window_size: usize,

    /// How long stats of removed servers stay queryable.
    pub stats_grace_period_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            response_time_window_size: 1000,
            stats_grace_period_secs: 30 * 60,
        }
    }
}

/// Server list refresh.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerListConfig {
    /// Refresh interval in seconds.
    pub refresh_interval_secs: u64,
}

impl Default for ServerListConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
        }
    }
}

/// Active health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
            timeout_secs: 2,
            path: "/health".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_client_gets_defaults() {
        let cfg: BalancerConfig = toml::from_str(
            r#"
            [[clients]]
            name = "users"
            servers = [{ address = "10.0.0.1:8080", zone = "a" }]
            "#,
        )
        .unwrap();

        let client = &cfg.clients[0];
        assert_eq!(client.rule, "round_robin");
        assert_eq!(client.retry, RetryConfig::default());
        assert_eq!(client.retry.max_retries_on_next_server, 1);
        assert_eq!(client.circuit_breaker.connection_failure_threshold, 3);
        assert_eq!(client.zone.triggering_blackout_percentage, 0.99999);
        assert_eq!(client.servers[0].zone.as_deref(), Some("a"));
    }
}

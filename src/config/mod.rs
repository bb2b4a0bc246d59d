//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!     → ClientRegistry builds one load balancer per client
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ClientRegistry::apply_config swaps server lists
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::BalancerConfig;
pub use schema::ClientConfig;
pub use schema::ServerConfig;
pub use schema::{
    AdminConfig, AvailabilityConfig, CircuitBreakerConfig, HealthCheckConfig,
    ObservabilityConfig, RetryConfig, ServerListConfig, StatsConfig, ZoneConfig,
};

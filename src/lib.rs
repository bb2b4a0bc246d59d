//! Client-side load balancing library.
//!
//! Named clients pick a server per request with a pluggable selection rule,
//! track per-server statistics and circuit breakers, and retry failed
//! operations on the same or the next server.

// Core subsystems
pub mod config;
pub mod error;
pub mod load_balancer;
pub mod stats;

// Request execution
pub mod execution;
pub mod resilience;

// Server pool maintenance
pub mod discovery;
pub mod health;

// Process wiring
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod registry;

pub use config::BalancerConfig;
pub use error::{AbortExecution, ClientError, ConfigError, TransportErrorKind};
pub use execution::{ExecutionContext, ExecutionInfo, ExecutionListener, LoadBalancerCommand};
pub use lifecycle::Shutdown;
pub use load_balancer::{LoadBalancer, Server};
pub use registry::{ClientRegistry, NamedClient};
pub use resilience::{DefaultRetryHandler, RequestSpecificRetryHandler, RetryHandler};

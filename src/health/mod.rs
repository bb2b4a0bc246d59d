//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Ping each server of a load balancer
//!     → LoadBalancer::mark_up / mark_down
//!
//! Passive signal (stats):
//!     Connection failures observed by commands
//!     → ServerStats successive failure streak
//!     → circuit breaker blackout, consulted by selection rules
//! ```
//!
//! # Design Decisions
//! - Active pings flip the `alive` flag; passive failures never do
//! - Health state is per-server, not per-pool

pub mod active;

pub use active::{HealthMonitor, NoOpPing, Ping, PingUrl};

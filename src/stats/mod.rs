//! Statistics subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch:
//!     → server_stats.rs (active count +1, guard handed out)
//! Completion:
//!     → distribution.rs (window + lifetime response times)
//!     → server_stats.rs (active count -1, failure streak updated)
//! Selection:
//!     → registry.rs (zone snapshots, tripped / load checks)
//! ```
//!
//! # Design Decisions
//! - One registry per load balancer, passed explicitly (no statics)
//! - Counters are atomics; only the sample buffers sit behind a mutex
//! - Zone snapshots are recomputed on demand, never stored

pub mod distribution;
pub mod registry;
pub mod server_stats;

pub use registry::{LoadBalancerStats, ZoneSnapshot};
pub use server_stats::{ActiveRequestGuard, ServerStats, ServerStatsView};

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

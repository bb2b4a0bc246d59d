//! Server discovery subsystem.
//!
//! # Data Flow
//! ```text
//! server_list.rs (configured servers, swapped on config reload)
//!     → updater.rs (interval tick)
//!     → LoadBalancer::update_servers (copy-on-write swap)
//! ```

pub mod server_list;
pub mod updater;

pub use server_list::{ServerList, StaticServerList};
pub use updater::PollingServerListUpdater;

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Logging/metrics → Registry → Background tasks → Admin listener
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → Broadcast → Tasks exit their loops → In-flight commands cancelled
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then clients, then listeners
//! - Shutdown has a drain timeout; stragglers are abandoned

pub mod shutdown;
pub mod startup;

pub use shutdown::{shutdown_signal, Shutdown};
pub use startup::{run, StartupError};

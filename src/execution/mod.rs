//! Load-balanced execution subsystem.
//!
//! # Data Flow
//! ```text
//! caller's operation
//!     → command.rs (select server, dispatch, classify failure, retry)
//!         → load_balancer::LoadBalancer::choose
//!         → stats::ServerStats (active count guard, response time, failure streak)
//!         → resilience::RetryHandler (retriable? circuit-relevant? budgets)
//!     → listener.rs (start / per-server / terminal callbacks)
//!     → context.rs (submission id, attempt counters)
//! ```

pub mod command;
pub mod context;
pub mod listener;

pub use command::{CommandBuildError, LoadBalancerCommand, LoadBalancerCommandBuilder};
pub use context::{ExecutionContext, ExecutionInfo};
pub use listener::{ExecutionListener, ListenerError, ListenerInvoker};

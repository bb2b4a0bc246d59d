//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt against a server fails:
//!     → retries.rs (retriable? on which axis? circuit-relevant?)
//!     → circuit_breaker.rs (blackout window from the successive failure count)
//! ```
//!
//! # Design Decisions
//! - No wall-clock timeouts here; per-attempt deadlines belong to the operation
//! - Retry budgets are bounded per server and per submission
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod retries;

pub use retries::{DefaultRetryHandler, RequestSpecificRetryHandler, RetryHandler};

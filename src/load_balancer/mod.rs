//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Command needs a server
//!     → pool.rs (atomic snapshot of all servers)
//!     → SelectionRule::choose:
//!         - round_robin.rs (cyclic index over all servers, 10-try cap)
//!         - random.rs (uniform over reachable servers)
//!         - best_available.rs (fewest active requests)
//!         - predicate.rs (availability / zone filtering, then round robin)
//!         - zone.rs (pick a zone, delegate to a per-zone inner rule)
//!     → Arc<Server> or "no server available"
//! ```
//!
//! # Design Decisions
//! - Rules are stateless apart from their own counters; stats live in the pool
//! - Composition instead of inheritance: rules wrap rules, predicates wrap predicates
//! - Rules receive the full list; eligibility is decided per rule
//! - Rules are looked up by name from a compile-time table (registry.rs)

pub mod best_available;
pub mod pool;
pub mod predicate;
pub mod random;
pub mod registry;
pub mod round_robin;
pub mod server;
pub mod zone;

pub use pool::LoadBalancer;
pub use server::Server;

use std::fmt;
use std::sync::Arc;

use crate::stats::LoadBalancerStats;

/// Opaque caller-supplied hint passed through to selection rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(Arc<str>);

impl RoutingKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a rule may look at while choosing.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    /// Owning client, for logging.
    pub client: &'a str,
    /// Candidate servers, including ones currently marked down.
    pub servers: &'a [Arc<Server>],
    pub stats: &'a LoadBalancerStats,
    pub now_ms: u64,
}

impl<'a> SelectionContext<'a> {
    /// Same context restricted to a subset of servers.
    pub fn with_servers<'b>(&self, servers: &'b [Arc<Server>]) -> SelectionContext<'b>
    where
        'a: 'b,
    {
        SelectionContext {
            client: self.client,
            servers,
            stats: self.stats,
            now_ms: self.now_ms,
        }
    }

    /// Servers that are alive and ready to serve.
    pub fn reachable(&self) -> Vec<Arc<Server>> {
        self.servers
            .iter()
            .filter(|s| s.is_available())
            .cloned()
            .collect()
    }
}

/// Trait for server selection strategies.
pub trait SelectionRule: Send + Sync + fmt::Debug {
    /// Pick one server, or `None` when nothing is eligible.
    fn choose(&self, ctx: &SelectionContext<'_>, key: Option<&RoutingKey>) -> Option<Arc<Server>>;

    /// Registry name of the rule.
    fn name(&self) -> &'static str;
}

/// Try `primary`; when it yields nothing, ask `fallback`.
#[derive(Debug)]
pub struct FallbackRule {
    primary: Arc<dyn SelectionRule>,
    fallback: Arc<dyn SelectionRule>,
}

impl FallbackRule {
    pub fn new(primary: Arc<dyn SelectionRule>, fallback: Arc<dyn SelectionRule>) -> Self {
        Self { primary, fallback }
    }
}

impl SelectionRule for FallbackRule {
    fn choose(&self, ctx: &SelectionContext<'_>, key: Option<&RoutingKey>) -> Option<Arc<Server>> {
        self.primary.choose(ctx, key).or_else(|| {
            tracing::debug!(
                client = %ctx.client,
                primary = self.primary.name(),
                fallback = self.fallback.name(),
                "Primary rule found no server, falling back"
            );
            self.fallback.choose(ctx, key)
        })
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

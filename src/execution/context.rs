//! Per-submission retry bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::load_balancer::{RoutingKey, Server};

/// State of one submission, owned by its retry loop and lent to listeners.
#[derive(Debug)]
pub struct ExecutionContext {
    submission_id: Uuid,
    client: String,
    routing_key: Option<RoutingKey>,
    pinned: bool,
    started: Instant,
    server_attempt_count: u32,
    attempt_count: u32,
}

impl ExecutionContext {
    pub fn new(client: impl Into<String>, routing_key: Option<RoutingKey>, pinned: bool) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            client: client.into(),
            routing_key,
            pinned,
            started: Instant::now(),
            server_attempt_count: 0,
            attempt_count: 0,
        }
    }

    pub fn submission_id(&self) -> Uuid {
        self.submission_id
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn routing_key(&self) -> Option<&RoutingKey> {
        self.routing_key.as_ref()
    }

    /// True when the caller fixed the server up front.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Servers selected so far, including the current one.
    pub fn server_attempt_count(&self) -> u32 {
        self.server_attempt_count
    }

    /// Dispatches against the current server so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub(crate) fn begin_server(&mut self) {
        self.server_attempt_count += 1;
        self.attempt_count = 0;
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.attempt_count += 1;
    }

    /// Caller-facing view with zero-based counters.
    pub fn info(&self, server: Option<&Arc<Server>>) -> ExecutionInfo {
        ExecutionInfo {
            server: server.cloned(),
            attempt_number: self.attempt_count.saturating_sub(1),
            server_attempt_number: self.server_attempt_count.saturating_sub(1),
        }
    }
}

/// Where a submission stands, as reported to listeners.
///
/// Both counters are zero-based: a first attempt that succeeds reports `0, 0`.
#[derive(Debug, Clone)]
pub struct ExecutionInfo {
    pub server: Option<Arc<Server>>,
    pub attempt_number: u32,
    pub server_attempt_number: u32,
}

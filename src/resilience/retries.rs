//! Retry classification.
//!
//! # Responsibilities
//! - Decide whether a failure may be retried, on the same server or the next one
//! - Decide whether a failure counts toward a server's circuit breaker
//! - Carry the same-server and next-server retry budgets
//!
//! # Design Decisions
//! - No retry is the safe default; budgets must be enabled explicitly
//! - Only connect/timeout-class transport errors are retried by default
//! - An abort is never retried, whatever the other settings say
//! - Per-request overrides wrap a fallback handler instead of mutating it

use std::fmt;
use std::sync::Arc;

use crate::config::RetryConfig;
use crate::error::ClientError;

/// Retry policy consulted by the command after every failed attempt.
pub trait RetryHandler: Send + Sync + fmt::Debug {
    /// May `err` be retried on the same server (`same_server`) or on another one?
    fn is_retriable(&self, err: &ClientError, same_server: bool) -> bool;

    /// Does `err` mean the server itself could not be reached?
    fn is_circuit_tripping(&self, err: &ClientError) -> bool;

    fn max_retries_on_same_server(&self) -> u32;

    fn max_retries_on_next_server(&self) -> u32;
}

/// Errors no policy may retry.
fn is_terminal(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::Aborted(_)
            | ClientError::Cancelled
            | ClientError::NoServerAvailable { .. }
            | ClientError::RetriesExceeded { .. }
            | ClientError::RetriesOnNextServerExceeded { .. }
    )
}

/// Policy built from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct DefaultRetryHandler {
    max_retries_on_same_server: u32,
    max_retries_on_next_server: u32,
    retry_on_all_errors: bool,
}

impl DefaultRetryHandler {
    pub fn new(same_server: u32, next_server: u32, retry_on_all_errors: bool) -> Self {
        Self {
            max_retries_on_same_server: same_server,
            max_retries_on_next_server: next_server,
            retry_on_all_errors,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries_on_same_server,
            config.max_retries_on_next_server,
            config.retry_on_all_errors,
        )
    }
}

impl Default for DefaultRetryHandler {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryHandler for DefaultRetryHandler {
    fn is_retriable(&self, err: &ClientError, same_server: bool) -> bool {
        if is_terminal(err) {
            return false;
        }
        if self.retry_on_all_errors {
            return true;
        }
        match err {
            ClientError::Application { retriable, .. } => *retriable,
            // The same server is still busy; another one might not be.
            ClientError::ServerThrottled { .. } => !same_server,
            ClientError::Transport { kind, .. } => kind.is_default_retriable(),
            _ => false,
        }
    }

    fn is_circuit_tripping(&self, err: &ClientError) -> bool {
        err.transport_kind()
            .map(|kind| kind.is_circuit_related())
            .unwrap_or(false)
    }

    fn max_retries_on_same_server(&self) -> u32 {
        self.max_retries_on_same_server
    }

    fn max_retries_on_next_server(&self) -> u32 {
        self.max_retries_on_next_server
    }
}

/// Per-call overrides layered over a shared handler.
#[derive(Debug, Clone)]
pub struct RequestSpecificRetryHandler {
    fallback: Arc<dyn RetryHandler>,
    ok_to_retry_on_connect_errors: bool,
    ok_to_retry_on_all_errors: bool,
    max_retries_on_same_server: Option<u32>,
    max_retries_on_next_server: Option<u32>,
}

impl RequestSpecificRetryHandler {
    pub fn new(fallback: Arc<dyn RetryHandler>) -> Self {
        Self {
            fallback,
            ok_to_retry_on_connect_errors: false,
            ok_to_retry_on_all_errors: false,
            max_retries_on_same_server: None,
            max_retries_on_next_server: None,
        }
    }

    /// Retry any connect-phase failure, including ones the fallback would not.
    pub fn ok_to_retry_on_connect_errors(mut self, ok: bool) -> Self {
        self.ok_to_retry_on_connect_errors = ok;
        self
    }

    pub fn ok_to_retry_on_all_errors(mut self, ok: bool) -> Self {
        self.ok_to_retry_on_all_errors = ok;
        self
    }

    pub fn with_max_retries_on_same_server(mut self, max: u32) -> Self {
        self.max_retries_on_same_server = Some(max);
        self
    }

    pub fn with_max_retries_on_next_server(mut self, max: u32) -> Self {
        self.max_retries_on_next_server = Some(max);
        self
    }
}

impl RetryHandler for RequestSpecificRetryHandler {
    fn is_retriable(&self, err: &ClientError, same_server: bool) -> bool {
        if is_terminal(err) {
            return false;
        }
        if self.ok_to_retry_on_all_errors {
            return true;
        }
        if self.ok_to_retry_on_connect_errors
            && err
                .transport_kind()
                .map(|kind| kind.is_connection_failure())
                .unwrap_or(false)
        {
            return true;
        }
        self.fallback.is_retriable(err, same_server)
    }

    fn is_circuit_tripping(&self, err: &ClientError) -> bool {
        self.fallback.is_circuit_tripping(err)
    }

    fn max_retries_on_same_server(&self) -> u32 {
        self.max_retries_on_same_server
            .unwrap_or_else(|| self.fallback.max_retries_on_same_server())
    }

    fn max_retries_on_next_server(&self) -> u32 {
        self.max_retries_on_next_server
            .unwrap_or_else(|| self.fallback.max_retries_on_next_server())
    }
}

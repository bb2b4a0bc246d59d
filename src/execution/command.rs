//! Load-balanced execution with retries.
//!
//! # Responsibilities
//! - Choose a server, dispatch the caller's operation, record the outcome
//! - Retry on the same server, then on other servers, within the handler's budgets
//! - Notify listeners and honor their abort signal
//! - Stop before the next dispatch once cancelled
//!
//! # State Machine
//! ```text
//! SelectingServer → Dispatching → Succeeded
//!                        │
//!                        ├→ RetryingSameServer → Dispatching
//!                        ├→ RetryingNextServer → SelectingServer
//!                        └→ Failed / Aborted
//! ```
//!
//! # Design Decisions
//! - One attempt in flight per submission; retries are strictly sequential
//! - The active-request guard is released on every path, including drop
//! - Callers only ever see the terminal outcome

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{AbortExecution, ClientError};
use crate::execution::context::ExecutionContext;
use crate::execution::listener::{ExecutionListener, ListenerInvoker};
use crate::load_balancer::{LoadBalancer, RoutingKey, Server};
use crate::observability::metrics;
use crate::resilience::{DefaultRetryHandler, RetryHandler};

/// Where the retry loop currently is.
enum ExecutionState<T> {
    SelectingServer,
    Dispatching(Arc<Server>),
    RetryingSameServer(Arc<Server>),
    RetryingNextServer(Arc<Server>),
    Succeeded(T, Arc<Server>),
    Failed(ClientError, Option<Arc<Server>>),
    Aborted(AbortExecution, Option<Arc<Server>>),
}

/// Error building a [`LoadBalancerCommand`].
#[derive(Debug, thiserror::Error)]
pub enum CommandBuildError {
    #[error("a load balancer is required")]
    MissingLoadBalancer,
}

/// Executes operations against servers chosen by a [`LoadBalancer`].
///
/// A command is reusable: each [`submit`](Self::submit) is an independent submission.
pub struct LoadBalancerCommand {
    load_balancer: Arc<LoadBalancer>,
    retry_handler: Arc<dyn RetryHandler>,
    listeners: ListenerInvoker,
    server: Option<Arc<Server>>,
    routing_key: Option<RoutingKey>,
    cancellation: CancellationToken,
}

impl fmt::Debug for LoadBalancerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadBalancerCommand")
            .field("client", &self.load_balancer.name())
            .field("retry_handler", &self.retry_handler)
            .field("listeners", &self.listeners.len())
            .field("server", &self.server.as_ref().map(|s| s.id().to_string()))
            .field("routing_key", &self.routing_key)
            .finish()
    }
}

impl LoadBalancerCommand {
    pub fn builder() -> LoadBalancerCommandBuilder {
        LoadBalancerCommandBuilder::default()
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    /// Run `operation` until it succeeds or the retry budgets are spent.
    pub async fn submit<T, F, Fut>(&self, operation: F) -> Result<T, ClientError>
    where
        F: Fn(Arc<Server>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut ctx = ExecutionContext::new(
            self.load_balancer.name(),
            self.routing_key.clone(),
            self.server.is_some(),
        );
        let span = tracing::info_span!(
            "submit",
            client = %self.load_balancer.name(),
            submission_id = %ctx.submission_id()
        );
        self.execute(&mut ctx, operation).instrument(span).await
    }

    async fn execute<T, F, Fut>(&self, ctx: &mut ExecutionContext, operation: F) -> Result<T, ClientError>
    where
        F: Fn(Arc<Server>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut state = match self.listeners.on_execution_start(ctx) {
            Ok(()) => ExecutionState::SelectingServer,
            Err(abort) => ExecutionState::Aborted(abort, None),
        };

        loop {
            state = match state {
                ExecutionState::SelectingServer => self.select(ctx),

                ExecutionState::RetryingSameServer(server) => {
                    tracing::debug!(server = %server, attempt = ctx.attempt_count(), "Retrying on same server");
                    metrics::record_retry(ctx.client(), "same_server");
                    ExecutionState::Dispatching(server)
                }

                ExecutionState::RetryingNextServer(server) => {
                    tracing::debug!(
                        previous = %server,
                        servers_tried = ctx.server_attempt_count(),
                        "Retrying on next server"
                    );
                    metrics::record_retry(ctx.client(), "next_server");
                    ExecutionState::SelectingServer
                }

                ExecutionState::Dispatching(server) => {
                    if self.cancellation.is_cancelled() {
                        tracing::debug!(server = %server, "Submission cancelled before dispatch");
                        ExecutionState::Failed(ClientError::Cancelled, Some(server))
                    } else {
                        self.dispatch(ctx, server, &operation).await
                    }
                }

                ExecutionState::Succeeded(value, server) => {
                    let info = ctx.info(Some(&server));
                    tracing::debug!(
                        server = %server,
                        attempt = info.attempt_number,
                        server_attempt = info.server_attempt_number,
                        "Submission succeeded"
                    );
                    self.listeners.on_execution_success(ctx, &info);
                    metrics::record_request(ctx.client(), "success");
                    return Ok(value);
                }

                ExecutionState::Failed(err, server) => {
                    let info = ctx.info(server.as_ref());
                    tracing::warn!(
                        server = ?server.as_ref().map(|s| s.id()),
                        servers_tried = ctx.server_attempt_count(),
                        attempts = ctx.attempt_count(),
                        error = %err,
                        "Submission failed"
                    );
                    self.listeners.on_execution_failed(ctx, &err, &info);
                    let outcome = match err {
                        ClientError::Cancelled => "cancelled",
                        _ => "failure",
                    };
                    metrics::record_request(ctx.client(), outcome);
                    return Err(err);
                }

                ExecutionState::Aborted(abort, server) => {
                    let info = ctx.info(server.as_ref());
                    tracing::info!(reason = %abort.reason, "Submission aborted");
                    self.listeners.on_execution_aborted(ctx, &abort, &info);
                    metrics::record_request(ctx.client(), "aborted");
                    return Err(ClientError::Aborted(abort));
                }
            };
        }
    }

    fn select<T>(&self, ctx: &mut ExecutionContext) -> ExecutionState<T> {
        let chosen = match &self.server {
            Some(pinned) => Ok(pinned.clone()),
            None => self.load_balancer.choose(self.routing_key.as_ref()),
        };
        match chosen {
            Ok(server) => {
                ctx.begin_server();
                tracing::trace!(server = %server, server_attempt = ctx.server_attempt_count(), "Server selected");
                ExecutionState::Dispatching(server)
            }
            Err(err) => ExecutionState::Failed(err, None),
        }
    }

    async fn dispatch<T, F, Fut>(
        &self,
        ctx: &mut ExecutionContext,
        server: Arc<Server>,
        operation: &F,
    ) -> ExecutionState<T>
    where
        F: Fn(Arc<Server>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        ctx.begin_attempt();
        let info = ctx.info(Some(&server));
        if let Err(abort) = self.listeners.on_start_with_server(ctx, &info) {
            return ExecutionState::Aborted(abort, Some(server));
        }

        let stats = self.load_balancer.stats().single_server_stat(&server);
        let guard = stats.begin_request();

        match operation(server.clone()).await {
            Ok(value) => {
                let elapsed = guard.record_success();
                metrics::record_attempt(ctx.client(), server.id(), elapsed);
                ExecutionState::Succeeded(value, server)
            }
            Err(err) => {
                let tripping = self.retry_handler.is_circuit_tripping(&err);
                let (elapsed, successive) = guard.record_failure(tripping);
                metrics::record_attempt(ctx.client(), server.id(), elapsed);
                let threshold = self
                    .load_balancer
                    .stats()
                    .circuit_breaker_config()
                    .connection_failure_threshold;
                if tripping && successive >= threshold {
                    tracing::warn!(
                        server = %server,
                        successive_failures = successive,
                        blackout_secs = stats.blackout_period().as_secs(),
                        "Server circuit tripped"
                    );
                    metrics::record_circuit_trip(ctx.client(), server.id());
                }

                tracing::debug!(server = %server, attempt = ctx.attempt_count(), error = %err, "Attempt failed");
                if let Err(abort) = self.listeners.on_exception_with_server(ctx, &err, &info) {
                    return ExecutionState::Aborted(abort, Some(server));
                }
                self.after_failure(ctx, server, err)
            }
        }
    }

    /// Decide where a failed attempt leads.
    fn after_failure<T>(&self, ctx: &ExecutionContext, server: Arc<Server>, err: ClientError) -> ExecutionState<T> {
        let err = match err {
            ClientError::Aborted(abort) => return ExecutionState::Aborted(abort, Some(server)),
            other => other,
        };

        let handler = &self.retry_handler;
        if ctx.attempt_count() <= handler.max_retries_on_same_server()
            && handler.is_retriable(&err, true)
        {
            return ExecutionState::RetryingSameServer(server);
        }
        if !ctx.is_pinned()
            && ctx.server_attempt_count() <= handler.max_retries_on_next_server()
            && handler.is_retriable(&err, false)
        {
            return ExecutionState::RetryingNextServer(server);
        }

        let err = self.exhausted(ctx, &server, err);
        ExecutionState::Failed(err, Some(server))
    }

    /// Wrap the final error according to the budget that ran out, if any.
    fn exhausted(&self, ctx: &ExecutionContext, server: &Server, err: ClientError) -> ClientError {
        let handler = &self.retry_handler;
        let max_same = handler.max_retries_on_same_server();
        let max_next = handler.max_retries_on_next_server();

        if !ctx.is_pinned()
            && max_next > 0
            && ctx.server_attempt_count() > max_next
            && handler.is_retriable(&err, false)
        {
            return ClientError::RetriesOnNextServerExceeded {
                server: server.id().to_string(),
                servers_tried: ctx.server_attempt_count(),
                attempts: ctx.attempt_count(),
                source: Box::new(err),
            };
        }
        if max_same > 0 && ctx.attempt_count() > max_same && handler.is_retriable(&err, true) {
            return ClientError::RetriesExceeded {
                server: server.id().to_string(),
                attempts: ctx.attempt_count(),
                source: Box::new(err),
            };
        }
        err
    }
}

/// Builder for [`LoadBalancerCommand`].
#[derive(Default)]
pub struct LoadBalancerCommandBuilder {
    load_balancer: Option<Arc<LoadBalancer>>,
    retry_handler: Option<Arc<dyn RetryHandler>>,
    listeners: Vec<Arc<dyn ExecutionListener>>,
    server: Option<Arc<Server>>,
    routing_key: Option<RoutingKey>,
    cancellation: Option<CancellationToken>,
}

impl LoadBalancerCommandBuilder {
    pub fn load_balancer(mut self, load_balancer: Arc<LoadBalancer>) -> Self {
        self.load_balancer = Some(load_balancer);
        self
    }

    pub fn retry_handler(mut self, handler: Arc<dyn RetryHandler>) -> Self {
        self.retry_handler = Some(handler);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn listeners(mut self, listeners: Vec<Arc<dyn ExecutionListener>>) -> Self {
        self.listeners.extend(listeners);
        self
    }

    /// Pin every attempt to `server`; disables next-server retries.
    pub fn server(mut self, server: Arc<Server>) -> Self {
        self.server = Some(server);
        self
    }

    pub fn routing_key(mut self, key: RoutingKey) -> Self {
        self.routing_key = Some(key);
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn build(self) -> Result<LoadBalancerCommand, CommandBuildError> {
        let load_balancer = self
            .load_balancer
            .ok_or(CommandBuildError::MissingLoadBalancer)?;
        Ok(LoadBalancerCommand {
            load_balancer,
            retry_handler: self
                .retry_handler
                .unwrap_or_else(|| Arc::new(DefaultRetryHandler::default())),
            listeners: ListenerInvoker::new(self.listeners),
            server: self.server,
            routing_key: self.routing_key,
            cancellation: self.cancellation.unwrap_or_default(),
        })
    }
}

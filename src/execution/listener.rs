//! Execution listeners.
//!
//! Callbacks run synchronously on the submission's task. An `Abort` returned
//! before or during the retry loop stops the submission; any other listener
//! error is logged and ignored.

use std::sync::Arc;

use crate::error::{AbortExecution, ClientError};
use crate::execution::context::{ExecutionContext, ExecutionInfo};

/// Error a listener callback may return.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error(transparent)]
    Abort(#[from] AbortExecution),

    #[error("listener failed: {0}")]
    Other(String),
}

/// Hooks into the lifecycle of a submission. Every method defaults to a no-op.
pub trait ExecutionListener: Send + Sync {
    /// Before the first server is chosen.
    fn on_execution_start(&self, _ctx: &ExecutionContext) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Before each dispatch.
    fn on_start_with_server(
        &self,
        _ctx: &ExecutionContext,
        _info: &ExecutionInfo,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    /// After each failed dispatch, before the retry decision.
    fn on_exception_with_server(
        &self,
        _ctx: &ExecutionContext,
        _err: &ClientError,
        _info: &ExecutionInfo,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_execution_success(
        &self,
        _ctx: &ExecutionContext,
        _info: &ExecutionInfo,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Terminal failure; `err` is the error the caller will see.
    fn on_execution_failed(
        &self,
        _ctx: &ExecutionContext,
        _err: &ClientError,
        _info: &ExecutionInfo,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_execution_aborted(
        &self,
        _ctx: &ExecutionContext,
        _abort: &AbortExecution,
        _info: &ExecutionInfo,
    ) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Fans every callback out to all registered listeners, in order.
#[derive(Clone, Default)]
pub struct ListenerInvoker {
    listeners: Vec<Arc<dyn ExecutionListener>>,
}

impl ListenerInvoker {
    pub fn new(listeners: Vec<Arc<dyn ExecutionListener>>) -> Self {
        Self { listeners }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Run `call` on every listener; the first abort wins, other errors are logged.
    fn each<F>(&self, callback: &'static str, ctx: &ExecutionContext, call: F) -> Result<(), AbortExecution>
    where
        F: Fn(&dyn ExecutionListener) -> Result<(), ListenerError>,
    {
        let mut abort = None;
        for listener in &self.listeners {
            match call(&**listener) {
                Ok(()) => {}
                Err(ListenerError::Abort(a)) => {
                    if abort.is_none() {
                        abort = Some(a);
                    }
                }
                Err(ListenerError::Other(message)) => {
                    tracing::warn!(
                        submission_id = %ctx.submission_id(),
                        callback,
                        error = %message,
                        "Execution listener failed"
                    );
                }
            }
        }
        abort.map_or(Ok(()), Err)
    }

    pub fn on_execution_start(&self, ctx: &ExecutionContext) -> Result<(), AbortExecution> {
        self.each("on_execution_start", ctx, |l| l.on_execution_start(ctx))
    }

    pub fn on_start_with_server(
        &self,
        ctx: &ExecutionContext,
        info: &ExecutionInfo,
    ) -> Result<(), AbortExecution> {
        self.each("on_start_with_server", ctx, |l| l.on_start_with_server(ctx, info))
    }

    pub fn on_exception_with_server(
        &self,
        ctx: &ExecutionContext,
        err: &ClientError,
        info: &ExecutionInfo,
    ) -> Result<(), AbortExecution> {
        self.each("on_exception_with_server", ctx, |l| {
            l.on_exception_with_server(ctx, err, info)
        })
    }

    // Terminal callbacks: the outcome is already decided, so aborts are only logged.

    pub fn on_execution_success(&self, ctx: &ExecutionContext, info: &ExecutionInfo) {
        let result = self.each("on_execution_success", ctx, |l| l.on_execution_success(ctx, info));
        log_late_abort(ctx, "on_execution_success", result);
    }

    pub fn on_execution_failed(&self, ctx: &ExecutionContext, err: &ClientError, info: &ExecutionInfo) {
        let result = self.each("on_execution_failed", ctx, |l| l.on_execution_failed(ctx, err, info));
        log_late_abort(ctx, "on_execution_failed", result);
    }

    pub fn on_execution_aborted(
        &self,
        ctx: &ExecutionContext,
        abort: &AbortExecution,
        info: &ExecutionInfo,
    ) {
        let result = self.each("on_execution_aborted", ctx, |l| {
            l.on_execution_aborted(ctx, abort, info)
        });
        log_late_abort(ctx, "on_execution_aborted", result);
    }
}

fn log_late_abort(ctx: &ExecutionContext, callback: &'static str, result: Result<(), AbortExecution>) {
    if let Err(abort) = result {
        tracing::debug!(
            submission_id = %ctx.submission_id(),
            callback,
            reason = %abort.reason,
            "Ignoring abort raised after the submission finished"
        );
    }
}

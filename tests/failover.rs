//! Retry and failover behavior of commands built from the client registry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use client_balancer::config::RetryConfig;
use client_balancer::error::ErrorKind;
use client_balancer::execution::ListenerError;
use client_balancer::{ClientError, ExecutionContext, ExecutionInfo, ExecutionListener};

mod common;

#[tokio::test]
async fn test_refused_server_fails_over_to_next() {
    let registry = common::registry(vec![common::client_config(
        "orders",
        "round_robin",
        &[("10.0.0.1:8080", "a"), ("10.0.0.2:8080", "a"), ("10.0.0.3:8080", "a")],
    )]);
    let log = common::CallLog::default();

    for _ in 0..9 {
        let cmd = registry.command("orders").unwrap().build().unwrap();
        let log = log.clone();
        let result = cmd
            .submit(move |server| {
                log.record(&server);
                async move {
                    if server.id() == "10.0.0.2:8080" {
                        Err(common::refused(&server))
                    } else {
                        Ok(server.id().to_string())
                    }
                }
            })
            .await;
        assert_ne!(result.unwrap(), "10.0.0.2:8080");
    }

    let lb = registry.get("orders").unwrap().load_balancer().clone();
    let bad = lb.find("10.0.0.2:8080").unwrap();
    let bad_calls = log.counts().get("10.0.0.2:8080").copied().unwrap_or(0) as u64;
    assert!(bad_calls > 0);
    assert_eq!(lb.server_stats(&bad).failure_count, bad_calls);
    assert_eq!(lb.server_stats(&bad).active_requests, 0);
}

#[tokio::test]
async fn test_exhausting_every_budget_tries_distinct_servers() {
    let mut config = common::client_config(
        "orders",
        "round_robin",
        &[("10.0.0.1:8080", "a"), ("10.0.0.2:8080", "a"), ("10.0.0.3:8080", "a")],
    );
    config.retry = RetryConfig {
        max_retries_on_same_server: 1,
        max_retries_on_next_server: 2,
        retry_on_all_errors: false,
    };
    let registry = common::registry(vec![config]);
    let log = common::CallLog::default();

    let cmd = registry.command("orders").unwrap().build().unwrap();
    let calls = log.clone();
    let err = cmd
        .submit(move |server| {
            calls.record(&server);
            async move { Err::<(), _>(common::refused(&server)) }
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetriesOnNextServerExceeded);
    assert!(err.never_reached_server());
    assert!(matches!(err.last_cause(), ClientError::Transport { .. }));

    let calls = log.calls();
    assert_eq!(calls.len(), 6);
    // Each server is hit twice in a row: the first attempt and one same-server retry.
    for pair in calls.chunks(2) {
        assert_eq!(pair[0], pair[1]);
    }
    let distinct: HashSet<_> = calls.iter().collect();
    assert_eq!(distinct.len(), 3);
}

#[tokio::test]
async fn test_tripped_server_is_skipped_by_availability_filtering() {
    let registry = common::registry(vec![common::client_config(
        "orders",
        "availability_filtering",
        &[("10.0.0.1:8080", "a"), ("10.0.0.2:8080", "a")],
    )]);
    let lb = registry.get("orders").unwrap().load_balancer().clone();
    common::trip(&lb, "10.0.0.1:8080", 3);
    assert!(lb.server_stats(&lb.find("10.0.0.1:8080").unwrap()).circuit_tripped);

    let log = common::CallLog::default();
    for _ in 0..10 {
        let cmd = registry.command("orders").unwrap().build().unwrap();
        let log = log.clone();
        cmd.submit(move |server| {
            log.record(&server);
            async { Ok::<_, ClientError>(()) }
        })
        .await
        .unwrap();
    }
    assert_eq!(log.counts().get("10.0.0.2:8080"), Some(&10));
}

#[tokio::test]
async fn test_all_tripped_falls_back_to_whole_pool() {
    let registry = common::registry(vec![common::client_config(
        "orders",
        "availability_filtering",
        &[("10.0.0.1:8080", "a"), ("10.0.0.2:8080", "a")],
    )]);
    let lb = registry.get("orders").unwrap().load_balancer().clone();
    common::trip(&lb, "10.0.0.1:8080", 3);
    common::trip(&lb, "10.0.0.2:8080", 3);

    let cmd = registry.command("orders").unwrap().build().unwrap();
    assert!(cmd.submit(|_| async { Ok::<_, ClientError>(()) }).await.is_ok());
}

#[derive(Default)]
struct CountingListener {
    starts: AtomicU32,
    exceptions: AtomicU32,
    successes: AtomicU32,
    failures: AtomicU32,
}

impl ExecutionListener for CountingListener {
    fn on_start_with_server(&self, _ctx: &ExecutionContext, _info: &ExecutionInfo) -> Result<(), ListenerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_exception_with_server(
        &self,
        _ctx: &ExecutionContext,
        _err: &ClientError,
        _info: &ExecutionInfo,
    ) -> Result<(), ListenerError> {
        self.exceptions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_execution_success(&self, _ctx: &ExecutionContext, _info: &ExecutionInfo) -> Result<(), ListenerError> {
        self.successes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_execution_failed(
        &self,
        _ctx: &ExecutionContext,
        _err: &ClientError,
        _info: &ExecutionInfo,
    ) -> Result<(), ListenerError> {
        self.failures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_listener_sees_every_attempt() {
    let registry = common::registry(vec![common::client_config(
        "orders",
        "round_robin",
        &[("10.0.0.1:8080", "a"), ("10.0.0.2:8080", "a")],
    )]);
    let listener = Arc::new(CountingListener::default());
    let attempts = Arc::new(AtomicU32::new(0));

    let cmd = registry
        .command("orders")
        .unwrap()
        .listener(listener.clone())
        .build()
        .unwrap();
    let counter = attempts.clone();
    let result = cmd
        .submit(move |server| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(common::refused(&server))
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(listener.starts.load(Ordering::SeqCst), 2);
    assert_eq!(listener.exceptions.load(Ordering::SeqCst), 1);
    assert_eq!(listener.successes.load(Ordering::SeqCst), 1);
    assert_eq!(listener.failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_application_error_is_not_retried() {
    let registry = common::registry(vec![common::client_config(
        "orders",
        "round_robin",
        &[("10.0.0.1:8080", "a"), ("10.0.0.2:8080", "a")],
    )]);
    let attempts = Arc::new(AtomicU32::new(0));

    let cmd = registry.command("orders").unwrap().build().unwrap();
    let counter = attempts.clone();
    let err = cmd
        .submit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ClientError::application("bad request")) }
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Application);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_servers_down_fails_fast_without_dispatch() {
    let registry = common::registry(vec![common::client_config(
        "orders",
        "round_robin",
        &[("10.0.0.1:8080", "a"), ("10.0.0.2:8080", "b")],
    )]);
    let lb = registry.get("orders").unwrap().load_balancer().clone();
    for server in lb.all_servers().iter() {
        lb.mark_down(server.id());
    }
    let log = common::CallLog::default();

    let cmd = registry.command("orders").unwrap().build().unwrap();
    let calls = log.clone();
    let submitted = cmd.submit(move |server| {
        calls.record(&server);
        async { Ok::<_, ClientError>(()) }
    });
    let err = tokio::time::timeout(Duration::from_secs(2), submitted)
        .await
        .expect("submit did not finish")
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoServerAvailable);
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_dropped_submission_releases_active_request() {
    let registry = common::registry(vec![common::client_config(
        "orders",
        "round_robin",
        &[("10.0.0.1:8080", "a")],
    )]);
    let lb = registry.get("orders").unwrap().load_balancer().clone();
    let server = lb.find("10.0.0.1:8080").unwrap();
    let log = common::CallLog::default();

    let cmd = registry.command("orders").unwrap().build().unwrap();
    let calls = log.clone();
    let submitted = cmd.submit(move |server| {
        calls.record(&server);
        std::future::pending::<Result<(), ClientError>>()
    });
    // The timeout drops the in-flight submission.
    assert!(tokio::time::timeout(Duration::from_millis(50), submitted).await.is_err());

    assert_eq!(log.calls(), vec!["10.0.0.1:8080".to_string()]);
    let view = lb.server_stats(&server);
    assert_eq!(view.active_requests, 0);
    assert_eq!(view.total_requests, 1);
}

//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every server of a load balancer
//! - Mark servers up or down based on results

use axum::body::Body;
use axum::http::Request;
use futures_util::future::{self, BoxFuture, FutureExt};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::load_balancer::{LoadBalancer, Server};

/// Liveness probe for one server.
pub trait Ping: Send + Sync + fmt::Debug {
    fn is_alive<'a>(&'a self, server: &'a Server) -> BoxFuture<'a, bool>;
}

/// Treats every server as alive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPing;

impl Ping for NoOpPing {
    fn is_alive<'a>(&'a self, _server: &'a Server) -> BoxFuture<'a, bool> {
        future::ready(true).boxed()
    }
}

/// HTTP GET against a fixed path; alive on a 2xx within the timeout.
pub struct PingUrl {
    path: String,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl PingUrl {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            path: path.into(),
            timeout,
            client,
        }
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(config.path.clone(), Duration::from_secs(config.timeout_secs))
    }

    async fn probe(&self, server: &Server) -> bool {
        let uri = format!("http://{}{}", server.id(), self.path);
        let request = match Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", "client-balancer-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(server = %server, error = %e, "Failed to build health check request");
                return false;
            }
        };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(server = %server, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %server, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(server = %server, "Health check failed: timeout");
                false
            }
        }
    }
}

impl fmt::Debug for PingUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PingUrl")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Ping for PingUrl {
    fn is_alive<'a>(&'a self, server: &'a Server) -> BoxFuture<'a, bool> {
        self.probe(server).boxed()
    }
}

/// Runs a [`Ping`] over a load balancer's servers on an interval.
pub struct HealthMonitor {
    load_balancer: Arc<LoadBalancer>,
    ping: Arc<dyn Ping>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(load_balancer: Arc<LoadBalancer>, ping: Arc<dyn Ping>, config: &HealthCheckConfig) -> Self {
        Self {
            load_balancer,
            ping,
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            client = %self.load_balancer.name(),
            interval_secs = self.interval.as_secs(),
            ping = ?self.ping,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Ping every server once, concurrently, and apply the results.
    pub async fn check_all(&self) {
        let servers = self.load_balancer.all_servers();
        let results = future::join_all(servers.iter().map(|s| self.ping.is_alive(s))).await;

        for (server, alive) in servers.iter().zip(results) {
            if alive {
                self.load_balancer.mark_up(server.id());
            } else {
                self.load_balancer.mark_down(server.id());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::round_robin::RoundRobinRule;

    #[derive(Debug)]
    struct DownPort(u16);

    impl Ping for DownPort {
        fn is_alive<'a>(&'a self, server: &'a Server) -> BoxFuture<'a, bool> {
            future::ready(server.port() != self.0).boxed()
        }
    }

    fn lb() -> Arc<LoadBalancer> {
        let lb = LoadBalancer::new("t", Arc::new(RoundRobinRule::new()));
        lb.update_servers(vec![Server::new("127.0.0.1", 1), Server::new("127.0.0.1", 2)]);
        Arc::new(lb)
    }

    #[tokio::test]
    async fn test_check_all_marks_down_and_up() {
        let lb = lb();
        let monitor = HealthMonitor::new(lb.clone(), Arc::new(DownPort(2)), &HealthCheckConfig::default());
        monitor.check_all().await;
        assert_eq!(lb.reachable_servers().len(), 1);
        assert!(!lb.find("127.0.0.1:2").unwrap().is_alive());

        let monitor = HealthMonitor::new(lb.clone(), Arc::new(NoOpPing), &HealthCheckConfig::default());
        monitor.check_all().await;
        assert_eq!(lb.reachable_servers().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_checks_transition_once() {
        let lb = lb();
        let monitor = HealthMonitor::new(lb.clone(), Arc::new(DownPort(2)), &HealthCheckConfig::default());
        let server = lb.find("127.0.0.1:2").unwrap();
        assert!(server.is_alive());

        monitor.check_all().await;
        monitor.check_all().await;
        // Still down, so setting it down again reports no transition.
        assert!(!server.set_alive(false));
        assert!(lb.find("127.0.0.1:1").unwrap().set_alive(true));
    }

    #[tokio::test]
    async fn test_ping_url_unreachable_is_down() {
        let ping = PingUrl::new("/health", Duration::from_millis(500));
        // Port 9 (discard) is not expected to run an HTTP server.
        assert!(!ping.is_alive(&Server::new("127.0.0.1", 9)).await);
    }
}

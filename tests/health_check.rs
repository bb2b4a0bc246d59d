//! Active health checks against real sockets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use client_balancer::config::HealthCheckConfig;
use client_balancer::health::{HealthMonitor, PingUrl};
use client_balancer::load_balancer::round_robin::RoundRobinRule;
use client_balancer::{LoadBalancer, Server};

mod common;

#[tokio::test]
async fn test_monitor_follows_backend_health() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let addr = common::start_programmable_backend(move || {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, "ok".to_string())
            } else {
                (503, "draining".to_string())
            }
        }
    })
    .await;

    let lb = Arc::new(LoadBalancer::new("health", Arc::new(RoundRobinRule::new())));
    lb.update_servers(vec![Server::new(addr.ip().to_string(), addr.port())]);

    let config = HealthCheckConfig {
        enabled: true,
        ..HealthCheckConfig::default()
    };
    let ping = Arc::new(PingUrl::new("/health", Duration::from_secs(2)));
    let monitor = HealthMonitor::new(lb.clone(), ping, &config);

    monitor.check_all().await;
    assert_eq!(lb.reachable_servers().len(), 1);

    healthy.store(false, Ordering::SeqCst);
    monitor.check_all().await;
    assert!(lb.reachable_servers().is_empty());
    assert!(lb.choose(None).is_err());

    healthy.store(true, Ordering::SeqCst);
    monitor.check_all().await;
    assert_eq!(lb.reachable_servers().len(), 1);
}

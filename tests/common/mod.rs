//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use client_balancer::config::{BalancerConfig, ClientConfig, ServerConfig};
use client_balancer::{ClientError, ClientRegistry, LoadBalancer, Server, TransportErrorKind};

/// A client with `(address, zone)` servers and the given rule.
pub fn client_config(name: &str, rule: &str, servers: &[(&str, &str)]) -> ClientConfig {
    ClientConfig {
        name: name.to_string(),
        rule: rule.to_string(),
        servers: servers
            .iter()
            .map(|(address, zone)| ServerConfig::new(*address).in_zone(*zone))
            .collect(),
        ..ClientConfig::default()
    }
}

pub fn registry(clients: Vec<ClientConfig>) -> Arc<ClientRegistry> {
    let config = BalancerConfig {
        clients,
        ..BalancerConfig::default()
    };
    Arc::new(ClientRegistry::from_config(&config).unwrap())
}

pub fn refused(server: &Server) -> ClientError {
    ClientError::transport(TransportErrorKind::ConnectionRefused, server.id(), "connection refused")
}

/// Drive `server`'s successive connection failures up to `count`.
pub fn trip(lb: &LoadBalancer, server_id: &str, count: u32) {
    let server = lb.find(server_id).unwrap();
    let stats = lb.stats().single_server_stat(&server);
    for _ in 0..count {
        stats.begin_request().record_failure(true);
    }
}

/// Records which servers an operation was dispatched to.
#[derive(Debug, Default, Clone)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn record(&self, server: &Server) {
        self.calls.lock().unwrap().push(server.id().to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for id in self.calls() {
            *counts.entry(id).or_insert(0) += 1;
        }
        counts
    }
}

/// Start a programmable HTTP backend on an ephemeral port; returns its address.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

//! Server abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server and its immutable identity
//! - Track liveness and readiness flags (mutated by health checks)
//! - Parse configured addresses

use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

use crate::config::ServerConfig;

/// Zone assigned to servers that do not declare one.
pub const UNKNOWN_ZONE: &str = "UNKNOWN";

/// A single upstream server.
///
/// Identity (`host:port`) is fixed at construction; equality and hashing use it alone.
#[derive(Debug)]
pub struct Server {
    host: String,
    port: u16,
    id: String,
    scheme: Option<String>,
    zone: String,

    alive: AtomicBool,
    ready_to_serve: AtomicBool,
}

impl Server {
    /// Create a new server, alive and ready to serve.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let id = format!("{}:{}", host, port);
        Self {
            host,
            port,
            id,
            scheme: None,
            zone: UNKNOWN_ZONE.to_string(),
            alive: AtomicBool::new(true),
            ready_to_serve: AtomicBool::new(true),
        }
    }

    /// Parse `host:port`, a bare host (port 80) or an `http`/`https` URL.
    pub fn parse(address: &str) -> Option<Self> {
        let address = address.trim();
        if address.contains("://") {
            let url = Url::parse(address).ok()?;
            let host = url.host_str()?.to_string();
            let port = url.port_or_known_default()?;
            let mut server = Self::new(host, port);
            server.scheme = Some(url.scheme().to_string());
            return Some(server);
        }

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().ok()?),
            None => (address, 80),
        };
        if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '/') {
            return None;
        }
        Some(Self::new(host, port))
    }

    /// Build from a configured entry, `None` when the address does not parse.
    pub fn from_config(config: &ServerConfig) -> Option<Self> {
        let server = Self::parse(&config.address)?;
        Some(match &config.zone {
            Some(zone) => server.with_zone(zone.as_str()),
            None => server,
        })
    }

    /// Assign an availability zone.
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        let zone = zone.into();
        self.zone = if zone.is_empty() {
            UNKNOWN_ZONE.to_string()
        } else {
            zone
        };
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_ready_to_serve(&self) -> bool {
        self.ready_to_serve.load(Ordering::Acquire)
    }

    /// Alive and ready: eligible for selection.
    pub fn is_available(&self) -> bool {
        self.is_alive() && self.is_ready_to_serve()
    }

    /// Set the alive flag, returning the previous value.
    pub fn set_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::AcqRel)
    }

    pub fn set_ready_to_serve(&self, ready: bool) {
        self.ready_to_serve.store(ready, Ordering::Release);
    }

    /// Base URL for this server, defaulting to plain HTTP.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme.as_deref().unwrap_or("http"), self.id)
    }

    /// Serializable point-in-time view.
    pub fn view(&self) -> ServerView {
        ServerView {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            zone: self.zone.clone(),
            alive: self.is_alive(),
            ready_to_serve: self.is_ready_to_serve(),
        }
    }
}

impl Clone for Server {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            id: self.id.clone(),
            scheme: self.scheme.clone(),
            zone: self.zone.clone(),
            alive: AtomicBool::new(self.is_alive()),
            ready_to_serve: AtomicBool::new(self.is_ready_to_serve()),
        }
    }
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Server {}

impl Hash for Server {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Server state as reported by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ServerView {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub zone: String,
    pub alive: bool,
    pub ready_to_serve: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let s = Server::parse("10.0.0.1:8080").unwrap();
        assert_eq!(s.host(), "10.0.0.1");
        assert_eq!(s.port(), 8080);
        assert_eq!(s.id(), "10.0.0.1:8080");
        assert_eq!(s.zone(), UNKNOWN_ZONE);
        assert!(s.is_available());
    }

    #[test]
    fn test_parse_url_uses_scheme_default_port() {
        let s = Server::parse("https://api.internal").unwrap();
        assert_eq!(s.port(), 443);
        assert_eq!(s.scheme(), Some("https"));
        assert_eq!(s.base_url(), "https://api.internal:443");

        let plain = Server::parse("svc.local").unwrap();
        assert_eq!(plain.port(), 80);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Server::parse("not an address").is_none());
        assert!(Server::parse("host:notaport").is_none());
        assert!(Server::parse(":8080").is_none());
    }

    #[test]
    fn test_identity_ignores_health_flags() {
        let a = Server::new("h", 1).with_zone("z1");
        let b = Server::new("h", 1);
        b.set_alive(false);
        assert_eq!(a, b);

        b.set_ready_to_serve(false);
        assert!(!b.is_available());
        assert!(!b.clone().is_ready_to_serve());
    }
}

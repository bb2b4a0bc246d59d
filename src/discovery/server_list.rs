//! Server list sources.

use arc_swap::ArcSwap;
use std::fmt;

use crate::config::ClientConfig;
use crate::load_balancer::pool::servers_from_config;
use crate::load_balancer::Server;

/// Source of the servers a load balancer should know about.
pub trait ServerList: Send + Sync + fmt::Debug {
    /// Servers at startup.
    fn initial_servers(&self) -> Vec<Server>;

    /// Servers on each refresh.
    fn updated_servers(&self) -> Vec<Server>;
}

/// A configured list, replaced wholesale on config reload.
#[derive(Debug)]
pub struct StaticServerList {
    servers: ArcSwap<Vec<Server>>,
}

impl StaticServerList {
    pub fn new(servers: Vec<Server>) -> Self {
        Self {
            servers: ArcSwap::from_pointee(servers),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(servers_from_config(config))
    }

    /// Replace the list; picked up on the next refresh.
    pub fn set(&self, servers: Vec<Server>) {
        self.servers.store(std::sync::Arc::new(servers));
    }
}

impl ServerList for StaticServerList {
    fn initial_servers(&self) -> Vec<Server> {
        self.servers.load().as_slice().to_vec()
    }

    fn updated_servers(&self) -> Vec<Server> {
        self.initial_servers()
    }
}

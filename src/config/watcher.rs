//! Configuration file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::BalancerConfig;

/// Watches the configuration file and publishes every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    poll_interval: Duration,
    update_tx: mpsc::UnboundedSender<BalancerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<BalancerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            poll_interval: Duration::from_secs(2),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Poll interval for backends without native change notification.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start watching. The returned handle must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        // Seed with the current file so the initial write burst is not re-applied.
        let last_seen = Arc::new(Mutex::new(fs::read_to_string(&path).unwrap_or_default()));

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(config) = reload_if_changed(&path, &last_seen) {
                        let _ = tx.send(config);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Re-read `path`; returns the parsed config when the content changed and is valid.
///
/// Editors emit several events per save, so unchanged content is ignored.
fn reload_if_changed(path: &Path, last_seen: &Mutex<String>) -> Option<BalancerConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Config file unreadable, keeping current configuration");
            return None;
        }
    };

    {
        let mut last = last_seen.lock().ok()?;
        if *last == content {
            return None;
        }
        *last = content.clone();
    }

    tracing::info!(path = ?path, "Config file change detected, reloading");
    match parse_config(&content) {
        Ok(config) => {
            tracing::info!(clients = config.clients.len(), "Config reloaded");
            Some(config)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_only_on_valid_change() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let seen = Mutex::new(String::new());

        fs::write(file.path(), "[[clients]]\nname = \"a\"\n").unwrap();
        let config = reload_if_changed(file.path(), &seen).unwrap();
        assert_eq!(config.clients[0].name, "a");

        // Same bytes again: ignored.
        assert!(reload_if_changed(file.path(), &seen).is_none());

        // Invalid rule: rejected.
        fs::write(file.path(), "[[clients]]\nname = \"a\"\nrule = \"nope\"\n").unwrap();
        assert!(reload_if_changed(file.path(), &seen).is_none());
    }
}

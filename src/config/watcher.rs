//! Configuration file watcher for hot route reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::RouteConfig;

/// Monitors the configuration file and publishes each valid route list.
///
/// Clones publish to the same receiver.
#[derive(Debug, Clone)]
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<Vec<RouteConfig>>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for route table updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Vec<RouteConfig>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Load the file now and publish its routes (e.g. on SIGHUP).
    pub fn reload(&self) {
        publish(&self.path, &self.update_tx);
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!("Config file change detected, reloading routes");
                    publish(&path, &tx);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn publish(path: &Path, tx: &mpsc::UnboundedSender<Vec<RouteConfig>>) {
    match load_config(path) {
        Ok(config) => {
            let _ = tx.send(config.routes);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config; keeping current routes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_publishes_valid_routes_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handler.toml");
        std::fs::write(&path, "[[routes]]\nregex = \"^/a$\"\nview = \"views::echo\"\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        watcher.reload();
        let routes = rx.try_recv().unwrap();
        assert_eq!(routes[0].regex, "^/a$");

        std::fs::write(&path, "[[routes]]\nregex = \"^/a$\"\n").unwrap();
        watcher.reload();
        assert!(rx.try_recv().is_err());
    }
}

//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::RelayConfig;
use crate::config::validation::validate_config;

type Overrides = Arc<dyn Fn(RelayConfig) -> RelayConfig + Send + Sync>;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    overrides: Overrides,
    update_tx: mpsc::UnboundedSender<RelayConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// `overrides` is applied to every reloaded file before validation so
    /// command-line settings keep winning over the file.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new<F>(path: &Path, overrides: F) -> (Self, mpsc::UnboundedReceiver<RelayConfig>)
    where
        F: Fn(RelayConfig) -> RelayConfig + Send + Sync + 'static,
    {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                overrides: Arc::new(overrides),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let overrides = self.overrides.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match reload(&path, overrides.as_ref()) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    error = %e,
                                    "Failed to reload config, keeping current configuration"
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn reload(
    path: &Path,
    overrides: &(dyn Fn(RelayConfig) -> RelayConfig + Send + Sync),
) -> Result<RelayConfig, ConfigError> {
    let config = overrides(read_config(path)?);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

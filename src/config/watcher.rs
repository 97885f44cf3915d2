//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by replacing the file are still noticed. A reload is forwarded
//! only when the file content changed and the new content validates.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::AccelConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    last_applied: Mutex<Option<String>>,
    updates: mpsc::UnboundedSender<AccelConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AccelConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let last_applied = std::fs::read_to_string(path).ok();
        let watcher = Self {
            path: path.to_path_buf(),
            last_applied: Mutex::new(last_applied),
            updates,
        };
        (watcher, rx)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if concerns(&event, &self.path) => {
                    if let Some(config) = self.reload() {
                        let _ = self.updates.send(config);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }

    /// Read the file; a changed, valid configuration is returned.
    fn reload(&self) -> Option<AccelConfig> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Config file unreadable, keeping current configuration");
                return None;
            }
        };

        let mut last = self.last_applied.lock().ok()?;
        if last.as_deref() == Some(content.as_str()) {
            return None;
        }
        match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = ?self.path, "Config file changed, reloading");
                *last = Some(content);
                Some(config)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                None
            }
        }
    }
}

fn concerns(event: &Event, path: &Path) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == path.file_name())
}

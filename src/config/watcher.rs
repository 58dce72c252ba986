//! Configuration file watcher.
//!
//! Turns file changes into reload requests. It never reads or applies the
//! file itself: the reload runs on the server's housekeeping tick, debounced,
//! exactly as a SIGHUP would.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::lifecycle::reload::ReloadTrigger;

/// Watches the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    trigger: ReloadTrigger,
}

impl ConfigWatcher {
    pub fn new(path: &Path, trigger: ReloadTrigger) -> Self {
        Self {
            path: path.to_path_buf(),
            trigger,
        }
    }

    /// Start watching. The returned watcher stops when dropped.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// (write to temp, rename over) are still seen.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let target = self.path.clone();
        let trigger = self.trigger.clone();
        let file_name = target.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant && ours {
                        tracing::debug!(path = ?target, "Configuration file changed, reload requested");
                        trigger.request();
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Configuration watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let watched = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher.watch(watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Configuration watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_change_requests_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[agent]\n").unwrap();

        let trigger = ReloadTrigger::new();
        let _watcher = ConfigWatcher::new(&path, trigger.clone()).run().unwrap();

        std::fs::write(&path, "[agent]\nport = 2346\n").unwrap();

        let mut seen = false;
        for _ in 0..50 {
            if trigger.is_pending() {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(seen, "watcher did not request a reload");
    }
}

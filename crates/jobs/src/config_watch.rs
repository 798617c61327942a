use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Filesystem change events are debounced over this window before a reload
/// fires; editors typically write a file several times in quick succession.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Configuration file watcher.
///
/// Watches the config file's parent directory (editors replace files rather
/// than writing in place, which unregisters inode-level watches) and calls
/// `on_change` after the event stream has been quiet for the debounce
/// window. The callback owns parsing, validation, and the subsystem diff;
/// a failed reload leaves the previous configuration in effect.
pub struct ConfigWatchJob {
    path: PathBuf,
    on_change: Arc<dyn Fn() + Send + Sync>,
    shutdown: CancellationToken,
}

impl ConfigWatchJob {
    pub fn new(path: PathBuf, on_change: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            path,
            on_change,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        let watch_dir = match self.path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::channel::<()>(16);
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher: RecommendedWatcher = match notify::recommended_watcher(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let relevant = match &file_name {
                        Some(name) => event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(name.as_os_str())),
                        None => true,
                    };
                    if relevant && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = tx.blocking_send(());
                    }
                }
                Err(e) => warn!(error = %e, "Config watch error"),
            },
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(error = %e, "Failed to create config watcher; hot reload disabled");
                return;
            }
        };

        if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
            error!(error = %e, path = %watch_dir.display(), "Failed to watch config directory; hot reload disabled");
            return;
        }

        info!(path = %self.path.display(), "Watching configuration for changes");

        tokio::spawn(async move {
            // Keep the watcher alive for the lifetime of the task.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("ConfigWatchJob: shutting down");
                        break;
                    }
                    event = rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                        // Swallow the burst, then fire once.
                        loop {
                            match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                                Ok(Some(())) => continue,
                                Ok(None) => return,
                                Err(_) => break,
                            }
                        }
                        info!(path = %self.path.display(), "Configuration changed; reloading");
                        (self.on_change)();
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn burst_of_writes_fires_one_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# initial").unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let job = Arc::new(ConfigWatchJob::new(
            path.clone(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        job.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        for i in 0..5 {
            std::fs::write(&path, format!("# edit {}", i)).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}

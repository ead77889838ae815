//! Hot reload of the mocks file.

use super::error::MockError;
use super::source::FileRuleSource;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Watches the directory holding a mocks file and reloads the source when the
/// file changes. Rapid bursts of events collapse into one reload.
pub struct RuleFileWatcher {
    _watcher: RecommendedWatcher,
    shutdown_tx: mpsc::Sender<()>,
}

impl RuleFileWatcher {
    /// Must be called from within a tokio runtime.
    pub fn spawn(source: Arc<FileRuleSource>, debounce: Duration) -> Result<Self, MockError> {
        let path = source.path().to_path_buf();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        let file_name = path.file_name().map(|n| n.to_os_string());

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = event_tx.blocking_send(event);
            }
        })
        .map_err(MockError::Watcher)?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(MockError::Watcher)?;
        info!(path = %path.display(), "Watching mocks file for changes");

        tokio::spawn(async move {
            let mut deadline: Option<tokio::time::Instant> = None;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Mocks watcher shutting down");
                        break;
                    }

                    Some(event) = event_rx.recv() => {
                        if matches!(event.kind, EventKind::Access(_)) {
                            continue;
                        }
                        let relevant = file_name.is_some()
                            && event.paths.iter().any(|p| p.file_name() == file_name.as_deref());
                        if relevant {
                            deadline = Some(tokio::time::Instant::now() + debounce);
                        }
                    }

                    _ = async {
                        match deadline {
                            Some(at) => tokio::time::sleep_until(at).await,
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        deadline = None;
                        if let Err(e) = source.reload() {
                            warn!("{e}; keeping previous mocks");
                        }
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            shutdown_tx,
        })
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RuleSource;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_reloads_on_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mocks.json");
        fs::write(&path, "[]").unwrap();

        let source = Arc::new(FileRuleSource::load(&path));
        let watcher =
            RuleFileWatcher::spawn(Arc::clone(&source), Duration::from_millis(50)).unwrap();
        assert!(source.snapshot().is_empty());

        fs::write(&path, r#"[{"request":{"url":"https://api.test/a"}}]"#).unwrap();

        let mut reloaded = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if source.snapshot().len() == 1 {
                reloaded = true;
                break;
            }
        }
        assert!(reloaded, "mocks were not reloaded after the file changed");
        watcher.shutdown().await;
    }
}

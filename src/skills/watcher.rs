//! Hot-reload file watching for skill directories.
//!
//! Watches every configured skill root with `notify`; any create/modify/
//! remove/rename event debounces for a fixed window and then triggers a
//! full `SkillEngine::reload()`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::snapshot::SkillEngine;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(350);

/// Spawns a background task that watches `roots` and reloads `engine` on
/// change, debounced by `DEBOUNCE_WINDOW`. Returns a handle whose drop
/// stops the watcher.
pub fn spawn_watcher(roots: Vec<PathBuf>, engine: Arc<SkillEngine>) -> WatcherHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = tx.send(());
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %e, "failed to create skill directory watcher");
            return WatcherHandle { _task: None, _watcher: None };
        }
    };

    for root in &roots {
        if root.is_dir() {
            if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
                warn!(path = %root.display(), error = %e, "failed to watch skill directory");
            }
        }
    }

    let task = tokio::spawn(async move {
        loop {
            if rx.recv().await.is_none() {
                return;
            }
            // Debounce: drain any further events that land within the window.
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(DEBOUNCE_WINDOW) => break,
                    more = rx.recv() => {
                        if more.is_none() {
                            return;
                        }
                    }
                }
            }
            let errors = engine.reload();
            for err in &errors {
                debug!(path = %err.path.display(), reason = %err.reason, "skill load error during hot reload");
            }
            debug!(version = engine.current().version, "skill snapshot reloaded");
        }
    });

    WatcherHandle { _task: Some(task), _watcher: Some(watcher) }
}

/// Keeps the watcher and its background task alive; dropping stops both.
pub struct WatcherHandle {
    _task: Option<tokio::task::JoinHandle<()>>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Some(task) = self._task.take() {
            task.abort();
        }
    }
}

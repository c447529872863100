//! Filesystem watches for collections.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collections::{CollectionsFinder, ModuleResolver};
use crate::events::WatchEvent;
use crate::watcher::translate::{classify, FsChange, Translator};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("filesystem watch failed: {0}")]
    Notify(#[from] notify::Error),

    #[error("watcher is already running")]
    AlreadyWatching,

    #[error("watcher has been closed")]
    AlreadyClosed,
}

/// Lifecycle of a [`CollectionWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Closed,
}

struct Active {
    // Dropping the notify watchers closes the raw channels and ends the tasks.
    _manifests: Arc<Mutex<RecommendedWatcher>>,
    _directories: Arc<Mutex<RecommendedWatcher>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Watches manifests and collection directories, emitting [`WatchEvent`]s.
///
/// Two notify watchers run independently: one over the manifest glob roots,
/// one over every known collection directory. Each feeds its own task, so
/// events of one watch are processed one at a time and in arrival order.
///
/// A manifest root that does not exist yet is watched through its nearest
/// existing ancestor until it appears, then scanned and watched itself.
pub struct CollectionWatcher {
    finder: Arc<CollectionsFinder>,
    translator: Translator,
    poll_interval: Duration,
    state: Mutex<(WatchState, Option<Active>)>,
}

impl CollectionWatcher {
    pub fn new(
        finder: Arc<CollectionsFinder>,
        resolver: Arc<dyn ModuleResolver>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            translator: Translator::new(finder.clone(), resolver),
            finder,
            poll_interval,
            state: Mutex::new((WatchState::Idle, None)),
        }
    }

    pub fn state(&self) -> WatchState {
        self.lock().0
    }

    /// Attach both watches. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<mpsc::UnboundedReceiver<WatchEvent>, WatchError> {
        let mut guard = self.lock();
        match guard.0 {
            WatchState::Watching => return Err(WatchError::AlreadyWatching),
            WatchState::Closed => return Err(WatchError::AlreadyClosed),
            WatchState::Idle => {}
        }

        // Directory watches need the discovered map.
        self.finder.discover();

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let (manifest_tx, mut manifest_rx) = mpsc::unbounded_channel();
        let manifests = Arc::new(Mutex::new(self.notify_watcher(manifest_tx)?));
        let (_, mut pending) = attach_roots(&mut lock_watcher(&manifests), self.finder.watch_roots());

        let (directory_tx, mut directory_rx) = mpsc::unbounded_channel();
        let directories = Arc::new(Mutex::new(self.notify_watcher(directory_tx)?));
        {
            let mut watcher = lock_watcher(&directories);
            for directory in self.finder.directories() {
                watch_path(&mut watcher, &directory);
            }
        }

        let manifest_task = {
            let translator = self.translator.clone();
            let manifests = manifests.clone();
            let directories = directories.clone();
            let event_tx = event_tx.clone();
            tokio::spawn(async move {
                while let Some((change, path)) = manifest_rx.recv().await {
                    let mut events = Vec::new();
                    if change == FsChange::Created && !pending.is_empty() && path.is_dir() {
                        let (attached, missing) =
                            attach_roots(&mut lock_watcher(&manifests), std::mem::take(&mut pending));
                        pending = missing;
                        for root in attached {
                            events.extend(translator.scan(&root));
                        }
                    }
                    events.extend(translator.manifest(change, &path));

                    for event in events {
                        if let WatchEvent::Added(descriptor) = &event {
                            watch_path(&mut lock_watcher(&directories), &descriptor.directory);
                        }
                        if event_tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            })
        };

        let directory_task = {
            let translator = self.translator.clone();
            tokio::spawn(async move {
                while let Some((_, path)) = directory_rx.recv().await {
                    for event in translator.file(&path) {
                        if event_tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            })
        };

        *guard = (
            WatchState::Watching,
            Some(Active {
                _manifests: manifests,
                _directories: directories,
                tasks: vec![manifest_task, directory_task],
            }),
        );
        tracing::info!("Watching collections for changes...");
        Ok(event_rx)
    }

    /// Stop watching. The event stream ends once pending events drain.
    pub fn close(&self) {
        let mut guard = self.lock();
        if let Some(active) = guard.1.take() {
            for task in &active.tasks {
                task.abort();
            }
        }
        if guard.0 != WatchState::Closed {
            tracing::info!("Collection watcher closed");
        }
        guard.0 = WatchState::Closed;
    }

    fn notify_watcher(
        &self,
        tx: mpsc::UnboundedSender<(FsChange, std::path::PathBuf)>,
    ) -> Result<RecommendedWatcher, WatchError> {
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in classify(&event) {
                        let _ = tx.send(change);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;
        Ok(watcher)
    }

    fn lock(&self) -> MutexGuard<'_, (WatchState, Option<Active>)> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CollectionWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_watcher(watcher: &Mutex<RecommendedWatcher>) -> MutexGuard<'_, RecommendedWatcher> {
    watcher.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Watch every root that exists. A missing root gets a non-recursive watch on
/// its nearest existing ancestor and is returned as pending.
fn attach_roots(watcher: &mut RecommendedWatcher, roots: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut attached = Vec::new();
    let mut pending = Vec::new();
    for root in roots {
        if root.exists() {
            watch_path(watcher, &root);
            attached.push(root);
            continue;
        }
        match root.ancestors().find(|p| p.exists()) {
            Some(ancestor) => {
                tracing::debug!(root = ?root, ancestor = ?ancestor, "Watch root missing, waiting for it");
                if let Err(e) = watcher.watch(ancestor, RecursiveMode::NonRecursive) {
                    tracing::warn!(path = ?ancestor, error = %e, "Failed to watch path");
                }
                pending.push(root);
            }
            None => tracing::warn!(path = ?root, "Watch root has no existing ancestor, skipping"),
        }
    }
    (attached, pending)
}

fn watch_path(watcher: &mut RecommendedWatcher, path: &Path) {
    if !path.exists() {
        tracing::warn!(path = ?path, "Watch path does not exist, skipping");
        return;
    }
    match watcher.watch(path, RecursiveMode::Recursive) {
        Ok(()) => tracing::debug!(path = ?path, "Watching"),
        Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to watch path"),
    }
}

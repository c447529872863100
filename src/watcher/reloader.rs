//! Reload loop: applies watch events to the loader and the route table.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::collections::CollectionsLoader;
use crate::events::{EventBus, HostEvent, WatchEvent};
use crate::observability::metrics;
use crate::routing::{RouteCompiler, Routes};

/// Consumes [`WatchEvent`]s one at a time.
pub struct Reloader {
    loader: Arc<CollectionsLoader>,
    compiler: Arc<RouteCompiler>,
    routes: Arc<Routes>,
    events: EventBus,
}

impl Reloader {
    pub fn new(
        loader: Arc<CollectionsLoader>,
        compiler: Arc<RouteCompiler>,
        routes: Arc<Routes>,
        events: EventBus,
    ) -> Self {
        Self {
            loader,
            compiler,
            routes,
            events,
        }
    }

    /// Apply one event. Never panics and never fails: problems are published.
    pub fn apply(&self, event: WatchEvent) {
        metrics::record_reload(event.kind());
        self.events.emit(HostEvent::Watch(event.clone()));

        match event {
            WatchEvent::Added(descriptor) => {
                self.events.info(format!(
                    "Collection {:?} has been added, initializing...",
                    descriptor.manifest_path
                ));
                self.loader.load_one(descriptor);
            }
            WatchEvent::ChangedLogic(descriptor) => {
                self.events.info(format!(
                    "Logic of the \"{}\" collection has been changed, reinitializing...",
                    descriptor.name
                ));
                // Drop any module cached by a load that raced the file change.
                self.loader.resolver().invalidate(&descriptor.logic_path);
                self.loader.load_one(descriptor);
            }
            WatchEvent::Changed { filename, collection } => {
                // Logic changes were handled by the preceding ChangedLogic.
                if filename == collection.logic_path {
                    return;
                }
                self.events.info(format!(
                    "Files of the \"{}\" collection have been changed, reinitializing...",
                    collection.name
                ));
                let current = self
                    .loader
                    .finder()
                    .get(&collection.name)
                    .unwrap_or(collection);
                self.loader.load_one(current);
            }
            WatchEvent::Removed(descriptor) => {
                self.events.info(format!(
                    "Collection {:?} has been unlinked, removing...",
                    descriptor.manifest_path
                ));
                let owned = self
                    .loader
                    .get_by_name(&descriptor.name)
                    .is_some_and(|c| c.descriptor.manifest_path == descriptor.manifest_path);
                if owned {
                    self.loader.remove(&descriptor.name);
                }
            }
        }

        self.recompile();
    }

    /// Rebuild routes from the current registry and publish them.
    pub fn recompile(&self) {
        let table = self.compiler.compile_table(&self.loader.get_all());
        self.routes.store(table);
    }

    /// Apply events until the stream ends or shutdown fires.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<WatchEvent>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.apply(event),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Reload loop stopped");
    }
}

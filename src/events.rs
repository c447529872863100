//! Typed host event bus.
//!
//! Every component receives an [`EventBus`] handle at construction time and
//! publishes lifecycle, warning and error signals on it. Publishing never
//! fails: with no subscribers the event is only logged.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::collections::Descriptor;

/// Semantic collection change produced by the watcher.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A manifest appeared and was registered.
    Added(Arc<Descriptor>),
    /// A file inside a collection directory changed, appeared or disappeared.
    Changed {
        filename: PathBuf,
        collection: Arc<Descriptor>,
    },
    /// The collection's logic module changed.
    ChangedLogic(Arc<Descriptor>),
    /// A manifest disappeared, or a changed manifest retired its old identity.
    Removed(Arc<Descriptor>),
}

impl WatchEvent {
    /// Name of the collection this event concerns.
    pub fn collection_name(&self) -> &str {
        match self {
            WatchEvent::Added(d) | WatchEvent::ChangedLogic(d) | WatchEvent::Removed(d) => &d.name,
            WatchEvent::Changed { collection, .. } => &collection.name,
        }
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "add",
            WatchEvent::Changed { .. } => "change",
            WatchEvent::ChangedLogic(_) => "change_logic",
            WatchEvent::Removed(_) => "unlink",
        }
    }
}

/// Everything the host reports to the outside world.
#[derive(Debug, Clone)]
pub enum HostEvent {
    CollectionFound(Arc<Descriptor>),
    CollectionLoaded { name: String },
    AllCollectionsLoaded { count: usize },
    RoutesCompiled { count: usize },
    Watch(WatchEvent),
    IncomingMessage { method: String, path: String },
    Forwarding { collection: String, handle: String },
    Info(String),
    Warning(String),
    Error(String),
}

/// Broadcast channel all components publish on.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HostEvent>,
}

impl EventBus {
    /// Create a new bus retaining up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }

    /// Publish an event and mirror it to the log.
    pub fn emit(&self, event: HostEvent) {
        crate::observability::logging::log_event(&event);
        let _ = self.tx.send(event);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(HostEvent::Warning(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(HostEvent::Error(message.into()));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(HostEvent::Info(message.into()));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

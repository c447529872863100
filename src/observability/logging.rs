//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Mirror host events into the log at a matching level
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - Lifecycle events log at info, per-request events at debug

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::events::HostEvent;

/// Default filter directive for a configured level.
pub fn default_directive(level: &str) -> String {
    format!("collection_host={level},tower_http={level}")
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub(crate) fn log_event(event: &HostEvent) {
    match event {
        HostEvent::CollectionFound(d) => {
            tracing::info!(collection = %d.name, manifest = ?d.manifest_path, "Collection found");
        }
        HostEvent::CollectionLoaded { name } => {
            tracing::info!(collection = %name, "Collection loaded");
        }
        HostEvent::AllCollectionsLoaded { count } => {
            tracing::info!(count, "All collections loaded");
        }
        HostEvent::RoutesCompiled { count } => {
            tracing::info!(count, "Routes compiled");
        }
        HostEvent::Watch(e) => {
            tracing::info!(kind = e.kind(), collection = %e.collection_name(), "Collection change");
        }
        HostEvent::IncomingMessage { method, path } => {
            tracing::debug!(method = %method, path = %path, "Incoming message");
        }
        HostEvent::Forwarding { collection, handle } => {
            tracing::debug!(collection = %collection, handle = %handle, "Forwarding");
        }
        HostEvent::Info(message) => tracing::info!("{}", message),
        HostEvent::Warning(message) => tracing::warn!("{}", message),
        HostEvent::Error(message) => tracing::error!("{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("debug"), "collection_host=debug,tower_http=debug");
    }
}

//! REST collection host library.
//!
//! Collections are directories holding a `collection.json` manifest and a
//! logic module. The host discovers them, compiles their endpoints into
//! routes, dispatches requests to their handles and reloads them in place
//! when their files change.

pub mod collections;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod host;
pub mod http;
pub mod lifecycle;
pub mod negotiation;
pub mod observability;
pub mod routing;
pub mod watcher;

pub use config::HostConfig;
pub use dispatch::{HandlerOutcome, HttpError, Payload, RequestContext, RequestDispatcher};
pub use events::{EventBus, HostEvent, WatchEvent};
pub use host::{CollectionHost, HostBuilder, HostError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;

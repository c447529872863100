//! Host assembly.
//!
//! # Responsibilities
//! - Validate configuration and construct every component exactly once
//! - Hand shared handles to components by constructor injection
//! - Initial load + route compilation (`ready`)
//! - Attach the hot-reload watcher and its reload loop (`watch`)
//!
//! # Data Flow
//! ```text
//! HostConfig
//!     → CollectionsFinder ─→ CollectionsLoader ─→ RouteCompiler ─→ Routes
//!                                  │                                 │
//!                                  └──────→ RequestDispatcher ←──────┘
//!                                                 │
//!                                                 → HttpServer
//! CollectionWatcher → mpsc<WatchEvent> → Reloader → CollectionsLoader / Routes
//! ```
//!
//! # Design Decisions
//! - No global state: two hosts in one process are fully independent
//! - Formatter registration happens before build; the table is fixed afterwards

use std::sync::Arc;
use std::time::Duration;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::collections::{CollectionsFinder, CollectionsLoader, CompositeResolver, ModuleResolver};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::{ConfigError, HostConfig};
use crate::dispatch::{HandleFn, HandlerResult, Middleware, RequestContext, RequestDispatcher};
use crate::events::EventBus;
use crate::http::HttpServer;
use crate::negotiation::{ContentNegotiator, Formatter, FormatterTable};
use crate::routing::{RouteCompiler, Routes};
use crate::watcher::{CollectionWatcher, Reloader, WatchError};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Vec<ValidationError>> for HostError {
    fn from(errors: Vec<ValidationError>) -> Self {
        HostError::Config(ConfigError::Validation(errors))
    }
}

/// Collects extension points before the host is assembled.
pub struct HostBuilder {
    config: HostConfig,
    events: EventBus,
    resolver: Option<Arc<dyn ModuleResolver>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    formatters: Vec<(String, Formatter)>,
    not_implemented: Option<HandleFn>,
}

impl HostBuilder {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            events: EventBus::default(),
            resolver: None,
            middlewares: Vec::new(),
            formatters: Vec::new(),
            not_implemented: None,
        }
    }

    /// Share an existing event bus instead of creating one.
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Resolver for logic modules. Defaults to [`CompositeResolver::default`].
    pub fn resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Register a formatter; `media` is a full type or a short name like `"json"`.
    pub fn formatter(mut self, media: impl Into<String>, formatter: Formatter) -> Self {
        self.formatters.push((media.into(), formatter));
        self
    }

    /// Handle requests no route matches.
    pub fn not_implemented<F>(mut self, handle: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.not_implemented = Some(Arc::new(handle));
        self
    }

    pub fn build(self) -> Result<CollectionHost, HostError> {
        validate_config(&self.config)?;

        let events = self.events;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(CompositeResolver::default()));

        let finder = Arc::new(CollectionsFinder::new(&self.config.collections, events.clone()));
        let loader = Arc::new(CollectionsLoader::new(finder.clone(), resolver.clone(), events.clone()));
        let compiler = Arc::new(RouteCompiler::new(self.config.routes.clone(), events.clone()));
        let routes = Arc::new(Routes::default());
        let negotiator = Arc::new(ContentNegotiator::new(FormatterTable::with_user(self.formatters)));

        let mut dispatcher = RequestDispatcher::new(routes.clone(), loader.clone(), negotiator.clone(), events.clone())
            .max_forward_depth(self.config.dispatch.max_forward_depth);
        for middleware in self.middlewares {
            dispatcher = dispatcher.middleware(middleware);
        }
        if let Some(handle) = self.not_implemented {
            dispatcher = dispatcher.not_implemented(handle);
        }

        let watcher = CollectionWatcher::new(
            finder,
            resolver,
            Duration::from_millis(self.config.collections.poll_interval_ms),
        );

        Ok(CollectionHost {
            config: self.config,
            events,
            loader,
            compiler,
            routes,
            negotiator,
            dispatcher: Arc::new(dispatcher),
            watcher,
        })
    }
}

/// A fully wired collection host.
pub struct CollectionHost {
    config: HostConfig,
    events: EventBus,
    loader: Arc<CollectionsLoader>,
    compiler: Arc<RouteCompiler>,
    routes: Arc<Routes>,
    negotiator: Arc<ContentNegotiator>,
    dispatcher: Arc<RequestDispatcher>,
    watcher: CollectionWatcher,
}

impl CollectionHost {
    pub fn builder(config: HostConfig) -> HostBuilder {
        HostBuilder::new(config)
    }

    /// Load every collection and publish the compiled routes.
    /// Returns the number of routes.
    pub fn ready(&self) -> usize {
        let collections = self.loader.load();
        let table = self.compiler.compile_table(&collections);
        let count = table.len();
        self.routes.store(table);
        tracing::info!(
            collections = collections.len(),
            routes = count,
            "Collection host ready"
        );
        count
    }

    /// Start watching collections and spawn the reload loop.
    ///
    /// Returns `None` when watching is disabled in the configuration.
    pub fn watch(&self, shutdown: broadcast::Receiver<()>) -> Result<Option<JoinHandle<()>>, HostError> {
        if !self.config.collections.watch {
            tracing::info!("Collection watching disabled");
            return Ok(None);
        }

        let rx = self.watcher.start()?;
        let reloader = Reloader::new(
            self.loader.clone(),
            self.compiler.clone(),
            self.routes.clone(),
            self.events.clone(),
        );
        Ok(Some(tokio::spawn(reloader.run(rx, shutdown))))
    }

    /// Stop watching. The host keeps serving the last loaded collections.
    pub fn close(&self) {
        self.watcher.close();
    }

    /// HTTP front end bound to this host's dispatcher.
    pub fn server(&self) -> HttpServer {
        HttpServer::new(self.dispatcher.clone(), &self.config.listener, &self.config.timeouts)
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    pub fn loader(&self) -> &Arc<CollectionsLoader> {
        &self.loader
    }

    pub fn routes(&self) -> &Arc<Routes> {
        &self.routes
    }

    pub fn negotiator(&self) -> &Arc<ContentNegotiator> {
        &self.negotiator
    }

    pub fn watch_state(&self) -> crate::watcher::WatchState {
        self.watcher.state()
    }
}

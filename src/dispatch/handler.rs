//! Handler factories and collection handlers.
//!
//! A loaded collection owns one [`HandlerFactory`]. For every request the
//! dispatcher asks the factory for a fresh [`CollectionHandler`] and invokes
//! the route's handle on it.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::dispatch::context::RequestContext;
use crate::dispatch::error::HttpError;
use crate::dispatch::outcome::HandlerOutcome;

pub type HandlerResult = Result<HandlerOutcome, HttpError>;

/// Request-scoped object exposing named handles.
#[async_trait]
pub trait CollectionHandler: Send + Sync {
    /// Whether a handle with this name exists.
    fn has_handle(&self, name: &str) -> bool;

    /// Invoke a handle. Only called for names `has_handle` accepted.
    async fn call(&self, name: &str, ctx: &mut RequestContext) -> HandlerResult;
}

/// Constructor-like capability producing request-scoped handlers.
pub trait HandlerFactory: Send + Sync {
    fn instantiate(&self, ctx: &RequestContext) -> Box<dyn CollectionHandler>;
}

/// A single async handle.
pub type HandleFn =
    Arc<dyn for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// Table of named async closures; the usual way to write handlers in Rust.
///
/// ```ignore
/// let widgets = HandlerMethods::new()
///     .handle("list", |_ctx| Box::pin(async { Ok(HandlerOutcome::json(json!([]))) }))
///     .handle_sync("one", |ctx| Ok(HandlerOutcome::text(ctx.param("id").unwrap_or_default())));
/// ```
#[derive(Clone, Default)]
pub struct HandlerMethods {
    methods: Arc<HashMap<String, HandleFn>>,
}

impl HandlerMethods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async handle.
    pub fn handle<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.methods).insert(name.into(), Arc::new(f));
        self
    }

    /// Register a handle that completes synchronously.
    pub fn handle_sync<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.handle(name, move |ctx| {
            let result = f(ctx);
            Box::pin(async move { result })
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

#[async_trait]
impl CollectionHandler for HandlerMethods {
    fn has_handle(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    async fn call(&self, name: &str, ctx: &mut RequestContext) -> HandlerResult {
        match self.methods.get(name) {
            Some(method) => method(ctx).await,
            None => Err(HttpError::internal(format!("Not found handler '{name}'"))),
        }
    }
}

impl HandlerFactory for HandlerMethods {
    fn instantiate(&self, _ctx: &RequestContext) -> Box<dyn CollectionHandler> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::outcome::Payload;
    use axum::http::Request;
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    fn context() -> RequestContext {
        let (parts, _) = Request::builder().uri("/x").body(()).unwrap().into_parts();
        RequestContext::new(parts, Bytes::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_methods_dispatch_by_name() {
        let methods = HandlerMethods::new()
            .handle("list", |ctx| {
                Box::pin(async move { Ok(HandlerOutcome::text(ctx.path().to_string())) })
            })
            .handle_sync("one", |_| Ok(HandlerOutcome::not_found()));

        let mut ctx = context();
        let handler = methods.instantiate(&ctx);
        assert!(handler.has_handle("list"));
        assert!(!handler.has_handle("missing"));

        let outcome = handler.call("list", &mut ctx).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Respond(Payload::Text("/x".into())));
        let outcome = handler.call("one", &mut ctx).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::not_found());
    }
}

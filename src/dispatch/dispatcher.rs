//! Request dispatch.
//!
//! # Responsibilities
//! - Match a request against the current route table snapshot
//! - Run middleware, then the route's handle
//! - Interpret handler outcomes (forward, not-found, redirect, suppress)
//! - Format the body, or render a structured error
//!
//! # Data Flow
//! ```text
//! Request<Bytes> + CancellationToken
//!     → RequestContext
//!     → RouteTable::find ── none → not-implemented handle (501)
//!     → middleware chain (registration order, cancellable)
//!     → CollectionHandler::call (cancellable)
//!     → outcome loop:
//!         Forward   → forward index → call again (depth-limited)
//!         NotFound  → 404
//!         Redirect  → Location + status, no formatting
//!         Suppress  → status + headers, empty body
//!         Respond   → ContentNegotiator → Formatter → body
//!     → any Err(HttpError) → error body via the same negotiator
//!           formatter missing → plain text with the error status
//!           formatter failing → plain text 500
//! ```
//!
//! # Design Decisions
//! - One route table snapshot per request, forwards included
//! - Forwards run inline in the request's task; status and formatting apply once
//! - Error rendering never panics

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::collections::CollectionsLoader;
use crate::dispatch::context::RequestContext;
use crate::dispatch::error::HttpError;
use crate::dispatch::handler::{HandleFn, HandlerResult};
use crate::dispatch::middleware::Middleware;
use crate::dispatch::outcome::{HandlerOutcome, Payload};
use crate::events::{EventBus, HostEvent};
use crate::negotiation::ContentNegotiator;
use crate::observability::metrics;
use crate::routing::{RouteTable, Routes};

/// Default bound on forward chains.
pub const DEFAULT_MAX_FORWARD_DEPTH: usize = 16;

/// Turns requests into responses using the current routes and collections.
pub struct RequestDispatcher {
    routes: Arc<Routes>,
    loader: Arc<CollectionsLoader>,
    negotiator: Arc<ContentNegotiator>,
    events: EventBus,
    middlewares: Vec<Arc<dyn Middleware>>,
    not_implemented: Option<HandleFn>,
    max_forward_depth: usize,
}

impl RequestDispatcher {
    pub fn new(
        routes: Arc<Routes>,
        loader: Arc<CollectionsLoader>,
        negotiator: Arc<ContentNegotiator>,
        events: EventBus,
    ) -> Self {
        Self {
            routes,
            loader,
            negotiator,
            events,
            middlewares: Vec::new(),
            not_implemented: None,
            max_forward_depth: DEFAULT_MAX_FORWARD_DEPTH,
        }
    }

    /// Append middleware; it runs after everything registered before it.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Replace the handle used when no route matches.
    pub fn not_implemented(mut self, handle: HandleFn) -> Self {
        self.not_implemented = Some(handle);
        self
    }

    pub fn max_forward_depth(mut self, depth: usize) -> Self {
        self.max_forward_depth = depth;
        self
    }

    pub fn routes(&self) -> &Arc<Routes> {
        &self.routes
    }

    /// Dispatch one request. Always produces a response.
    pub async fn dispatch(&self, request: Request<Bytes>, cancel: CancellationToken) -> Response<Body> {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let mut ctx = RequestContext::new(parts, body, cancel);
        let method = ctx.method.clone();

        self.events.emit(HostEvent::IncomingMessage {
            method: method.to_string(),
            path: ctx.uri.to_string(),
        });

        let response = match self.process(&mut ctx).await {
            Ok(response) => response,
            Err(error) => self.render_error(&mut ctx, error),
        };

        metrics::record_request(&method, response.status(), start.elapsed());
        response
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<Response<Body>, HttpError> {
        let table = self.routes.load();
        let matched = table.find(&ctx.method, ctx.path())?;

        self.run_middleware(ctx).await?;

        let outcome = match matched {
            Some((route, params)) => {
                ctx.params = params;
                self.invoke(ctx, &route.collection, &route.handle).await?
            }
            None => self.invoke_not_implemented(ctx).await?,
        };

        self.process_outcome(ctx, &table, outcome).await
    }

    async fn process_outcome(
        &self,
        ctx: &mut RequestContext,
        table: &RouteTable,
        mut outcome: HandlerOutcome,
    ) -> Result<Response<Body>, HttpError> {
        let mut depth = 0;
        loop {
            match outcome {
                HandlerOutcome::Respond(payload) => return self.format(ctx, payload),
                HandlerOutcome::Forward(forward) => {
                    depth += 1;
                    if depth > self.max_forward_depth {
                        return Err(HttpError::loop_detected(format!(
                            "Forward chain exceeded {} hops at {}.{}",
                            self.max_forward_depth, forward.collection, forward.handle
                        ))
                        .code("forwardLoop"));
                    }

                    let route = table
                        .by_handle(&forward.collection, &forward.handle)
                        .ok_or_else(|| forward_target_missing(table, &forward.collection, &forward.handle))?;

                    self.events.emit(HostEvent::Forwarding {
                        collection: route.collection.clone(),
                        handle: route.handle.clone(),
                    });
                    metrics::record_forward();

                    ctx.params.extend(forward.params);
                    outcome = self.invoke(ctx, &route.collection, &route.handle).await?;
                }
                HandlerOutcome::NotFound { message, code } => {
                    let mut error = match message {
                        Some(message) => HttpError::not_found(message),
                        None => HttpError::from_status(StatusCode::NOT_FOUND),
                    };
                    if let Some(code) = code {
                        error = error.code(code);
                    }
                    return Err(error);
                }
                HandlerOutcome::Redirect { location, status } => {
                    ctx.response.status = status;
                    ctx.response.set_header(header::LOCATION, &location);
                    ctx.response.headers.remove(header::CONTENT_LENGTH);
                    return Ok(build(ctx, Bytes::new()));
                }
                HandlerOutcome::Suppress => return Ok(build(ctx, Bytes::new())),
            }
        }
    }

    async fn run_middleware(&self, ctx: &mut RequestContext) -> Result<(), HttpError> {
        let cancel = ctx.cancellation().clone();
        for middleware in &self.middlewares {
            cancellable(&cancel, middleware.handle(ctx)).await??;
        }
        Ok(())
    }

    async fn invoke(&self, ctx: &mut RequestContext, collection: &str, handle: &str) -> HandlerResult {
        ctx.target(collection, handle);
        tracing::debug!(collection = %collection, handle = %handle, "Calling handle");

        let loaded = self
            .loader
            .get_by_name(collection)
            .ok_or_else(|| HttpError::internal(format!("Collection '{collection}' is not loaded")))?;

        let handler = loaded.factory.instantiate(ctx);
        if !handler.has_handle(handle) {
            let message = format!("Not found handler '{handle}' in collection's logic file '{collection}'");
            self.events.error(message.clone());
            return Err(HttpError::internal(message));
        }

        let cancel = ctx.cancellation().clone();
        cancellable(&cancel, handler.call(handle, ctx)).await?
    }

    async fn invoke_not_implemented(&self, ctx: &mut RequestContext) -> HandlerResult {
        match &self.not_implemented {
            Some(handle) => {
                let cancel = ctx.cancellation().clone();
                cancellable(&cancel, handle(ctx)).await?
            }
            None => Err(HttpError::not_implemented(format!(
                "Resource or collection '{}' not implemented in API",
                ctx.uri
            ))),
        }
    }

    fn format(&self, ctx: &mut RequestContext, payload: Payload) -> Result<Response<Body>, HttpError> {
        if ctx.method == Method::HEAD {
            return Ok(build(ctx, Bytes::new()));
        }

        let Some(formatter) = self.negotiator.get_formatter(ctx) else {
            return Err(if ctx.response.status == StatusCode::NOT_ACCEPTABLE {
                HttpError::not_acceptable(format!(
                    "No formatter accepts '{}'",
                    ctx.accept().unwrap_or_default()
                ))
            } else {
                HttpError::internal("No formatter available for the response")
            });
        };

        let body = formatter(ctx, &payload)?;
        Ok(build(ctx, body))
    }

    fn render_error(&self, ctx: &mut RequestContext, error: HttpError) -> Response<Body> {
        let status = error.status_code();
        if status.is_server_error() {
            self.events
                .error(format!("{} {} failed: {}", ctx.method, ctx.uri, error));
        } else {
            tracing::debug!(method = %ctx.method, uri = %ctx.uri, error = %error, "Request failed");
        }

        ctx.response.status = status;
        ctx.response.headers.remove(header::CONTENT_LENGTH);
        if ctx.method == Method::HEAD {
            return build(ctx, Bytes::new());
        }

        let Some(formatter) = self.negotiator.get_formatter(ctx) else {
            return plain_text(status, &error.to_string());
        };

        match formatter(ctx, &Payload::Json(error.to_value())) {
            Ok(body) => build(ctx, body),
            Err(format_error) => {
                self.events
                    .error(format!("Failed to format error response: {format_error}"));
                plain_text(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
            }
        }
    }
}

async fn cancellable<F, T>(cancel: &CancellationToken, future: F) -> Result<T, HttpError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HttpError::service_unavailable("Request was cancelled")),
        output = future => Ok(output),
    }
}

fn forward_target_missing(table: &RouteTable, collection: &str, handle: &str) -> HttpError {
    let message = if table.has_collection(collection) {
        format!("Handle {handle} not found for forward")
    } else {
        format!("Collection {collection} not found for forward")
    };
    HttpError::internal(message).code("forwardCollectionNotFound")
}

fn build(ctx: &RequestContext, body: Bytes) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = ctx.response.status;
    *response.headers_mut() = ctx.response.headers.clone();
    response
}

fn plain_text(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

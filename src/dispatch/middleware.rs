//! Request-scoped middleware.
//!
//! Middleware runs in registration order before the handler. An `Err`
//! short-circuits the request into error handling.

use async_trait::async_trait;

use crate::dispatch::context::RequestContext;
use crate::dispatch::error::HttpError;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), HttpError>;
}

/// Middleware backed by a synchronous closure.
pub struct FnMiddleware<F>(F);

/// Wrap a closure as middleware.
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&mut RequestContext) -> Result<(), HttpError> + Send + Sync + 'static,
{
    FnMiddleware(f)
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut RequestContext) -> Result<(), HttpError> + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), HttpError> {
        (self.0)(ctx)
    }
}

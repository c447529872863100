//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Request<Bytes>
//!     → context.rs (RequestContext: location, referrer, params, response state)
//!     → middleware.rs (registration order)
//!     → handler.rs (HandlerFactory → CollectionHandler::call)
//!     → outcome.rs (Respond | Forward | NotFound | Redirect | Suppress)
//!     → dispatcher.rs (result processing, formatting)
//!     → error.rs (HttpError {name, status, message, code})
//! ```
//!
//! # Design Decisions
//! - Handlers return a sum type instead of mutating shared action flags
//! - A context lives exactly one request and is never shared

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod outcome;

pub use context::{RequestContext, ResponseState};
pub use dispatcher::{RequestDispatcher, DEFAULT_MAX_FORWARD_DEPTH};
pub use error::{internal_from, HttpError};
pub use handler::{CollectionHandler, HandleFn, HandlerFactory, HandlerMethods, HandlerResult};
pub use middleware::{from_fn, FnMiddleware, Middleware};
pub use outcome::{Forward, HandlerOutcome, Payload};

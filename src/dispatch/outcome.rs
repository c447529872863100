//! What a handler asks the dispatcher to do next.

use std::collections::HashMap;
use axum::http::StatusCode;
use bytes::Bytes;
use serde_json::Value;

/// Response body before formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Binary(Bytes),
    Empty,
}

/// Target of an intra-process forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    pub collection: String,
    pub handle: String,
    /// Extra parameters merged into the context for the forwarded handler.
    pub params: HashMap<String, String>,
}

/// Result of a handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Format and send this body.
    Respond(Payload),
    /// Re-dispatch to another collection's handle within the same request.
    Forward(Forward),
    /// Raise a 404.
    NotFound {
        message: Option<String>,
        code: Option<String>,
    },
    /// Redirect and skip formatting.
    Redirect { location: String, status: StatusCode },
    /// Stop without writing a body.
    Suppress,
}

impl HandlerOutcome {
    pub fn json(value: Value) -> Self {
        HandlerOutcome::Respond(Payload::Json(value))
    }

    pub fn text(text: impl Into<String>) -> Self {
        HandlerOutcome::Respond(Payload::Text(text.into()))
    }

    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        HandlerOutcome::Respond(Payload::Binary(bytes.into()))
    }

    pub fn empty() -> Self {
        HandlerOutcome::Respond(Payload::Empty)
    }

    pub fn forward(collection: impl Into<String>, handle: impl Into<String>) -> Self {
        HandlerOutcome::Forward(Forward {
            collection: collection.into(),
            handle: handle.into(),
            params: HashMap::new(),
        })
    }

    pub fn not_found() -> Self {
        HandlerOutcome::NotFound {
            message: None,
            code: None,
        }
    }

    /// 302 redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        HandlerOutcome::Redirect {
            location: location.into(),
            status: StatusCode::FOUND,
        }
    }
}

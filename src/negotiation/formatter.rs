//! Response formatters.
//!
//! A formatter renders a [`Payload`] for one media type and may adjust the
//! response (headers, status). The built-ins always set `Content-Length`.

use std::sync::Arc;
use axum::http::header;
use bytes::Bytes;
use serde_json::Value;

use crate::dispatch::{HttpError, Payload, RequestContext};

/// Renders a body for a negotiated media type.
pub type Formatter =
    Arc<dyn Fn(&mut RequestContext, &Payload) -> Result<Bytes, HttpError> + Send + Sync>;

/// Wrap a closure as a [`Formatter`].
pub fn formatter<F>(f: F) -> Formatter
where
    F: Fn(&mut RequestContext, &Payload) -> Result<Bytes, HttpError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Built-in formatters keyed the way user formatters are registered.
pub fn builtin() -> Vec<(String, Formatter)> {
    vec![
        ("application/json; q=0.3".to_string(), formatter(json)),
        ("text/plain; q=0.2".to_string(), formatter(text)),
        ("application/octet-stream; q=0.1".to_string(), formatter(binary)),
    ]
}

/// JSON; binary payloads become an array of byte values.
pub fn json(ctx: &mut RequestContext, payload: &Payload) -> Result<Bytes, HttpError> {
    let body = match payload {
        Payload::Json(value) => serde_json::to_vec(value),
        Payload::Text(text) => serde_json::to_vec(text),
        Payload::Binary(bytes) => serde_json::to_vec(bytes.as_ref()),
        Payload::Empty => Ok(Vec::new()),
    }
    .map_err(|e| HttpError::internal(e.to_string()))?;

    ctx.response.set_content_length(body.len());
    Ok(Bytes::from(body))
}

/// Plain text; JSON strings are written unquoted.
pub fn text(ctx: &mut RequestContext, payload: &Payload) -> Result<Bytes, HttpError> {
    let body = match payload {
        Payload::Json(Value::String(text)) => Bytes::from(text.clone()),
        Payload::Json(value) => Bytes::from(value.to_string()),
        Payload::Text(text) => Bytes::from(text.clone()),
        Payload::Binary(bytes) => Bytes::from(String::from_utf8_lossy(bytes).into_owned()),
        Payload::Empty => Bytes::new(),
    };

    ctx.response.set_content_length(body.len());
    Ok(body)
}

pub fn binary(ctx: &mut RequestContext, payload: &Payload) -> Result<Bytes, HttpError> {
    let body = match payload {
        Payload::Binary(bytes) => bytes.clone(),
        Payload::Text(text) => Bytes::from(text.clone()),
        Payload::Json(Value::String(text)) => Bytes::from(text.clone()),
        Payload::Json(value) => Bytes::from(value.to_string()),
        Payload::Empty => Bytes::new(),
    };

    ctx.response
        .set_header(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref());
    ctx.response.set_content_length(body.len());
    Ok(body)
}

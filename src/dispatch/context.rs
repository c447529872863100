//! Per-request context.
//!
//! A [`RequestContext`] is created for every inbound request and lives exactly
//! as long as that request, including forwarded sub-dispatches. It is never
//! shared between requests, so it needs no locking.

use std::collections::HashMap;
use axum::http::{header, request::Parts, Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Response state handlers and formatters may adjust before the body is written.
#[derive(Debug, Clone)]
pub struct ResponseState {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Character set appended to the negotiated content type.
    pub charset: Option<String>,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            charset: None,
        }
    }
}

impl ResponseState {
    /// Declared `Content-Type`, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Set a header, ignoring values that are not valid header text.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, value = %value, "Dropping invalid header value"),
        }
    }

    pub fn set_content_length(&mut self, len: usize) {
        self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
}

/// Everything a middleware, handler or formatter knows about the current request.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Absolute location of the request.
    pub location: Url,
    /// Parsed `Referer` header.
    pub referrer: Option<Url>,
    /// Collection the current handler belongs to.
    pub name: String,
    /// Handle being invoked.
    pub handle_name: String,
    /// Named route parameters (plus forward additions).
    pub params: HashMap<String, String>,
    pub response: ResponseState,
    /// Request-scoped storage for middleware.
    pub extensions: Extensions,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Build a context from request parts and a buffered body.
    pub fn new(parts: Parts, body: Bytes, cancel: CancellationToken) -> Self {
        let location = location_of(&parts.headers, &parts.uri);
        let referrer = parts
            .headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| location.join(v).ok());

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            location,
            referrer,
            name: String::new(),
            handle_name: String::new(),
            params: HashMap::new(),
            response: ResponseState::default(),
            extensions: parts.extensions,
            cancel,
        }
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw `Accept` header, if any.
    pub fn accept(&self) -> Option<&str> {
        self.headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
    }

    /// Route parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Cancellation signal supplied by the caller.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Point the context at a (possibly forwarded) handler.
    pub(crate) fn target(&mut self, collection: &str, handle: &str) {
        self.name = collection.to_string();
        self.handle_name = handle.to_string();
    }
}

fn location_of(headers: &HeaderMap, uri: &Uri) -> Url {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let scheme = uri.scheme_str().unwrap_or("http");
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    Url::parse(&format!("{scheme}://{host}{path}"))
        .or_else(|_| Url::parse(&format!("http://localhost{path}")))
        .unwrap_or_else(|_| Url::parse("http://localhost/").expect("static URL is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn context(request: Request<()>) -> RequestContext {
        let (parts, _) = request.into_parts();
        RequestContext::new(parts, Bytes::new(), CancellationToken::new())
    }

    #[test]
    fn test_location_and_referrer() {
        let ctx = context(
            Request::builder()
                .uri("/widgets/7?full=1")
                .header("host", "api.example.com")
                .header("referer", "/widgets")
                .body(())
                .unwrap(),
        );

        assert_eq!(ctx.location.as_str(), "http://api.example.com/widgets/7?full=1");
        assert_eq!(ctx.referrer.as_ref().unwrap().as_str(), "http://api.example.com/widgets");
        assert_eq!(ctx.path(), "/widgets/7");
    }

    #[test]
    fn test_location_without_host_header() {
        let ctx = context(Request::builder().uri("/").body(()).unwrap());
        assert_eq!(ctx.location.as_str(), "http://localhost/");
        assert!(ctx.referrer.is_none());
    }

    #[test]
    fn test_response_headers() {
        let mut state = ResponseState::default();
        state.set_header(header::CONTENT_TYPE, "text/plain");
        state.set_header(header::LOCATION, "bad\nvalue");
        assert_eq!(state.content_type(), Some("text/plain"));
        assert!(state.headers.get(header::LOCATION).is_none());
    }
}

//! Structured HTTP errors.
//!
//! Every failure inside the dispatch pipeline ends up as an [`HttpError`]:
//! `{name, status, message, code}`. Names and default codes are derived from
//! the canonical reason phrase of the status (`404` → `NotFoundError` /
//! `NotFound`).

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Error rendered to clients by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpError {
    pub name: String,
    pub status: u16,
    pub message: String,
    pub code: String,
}

impl HttpError {
    /// Build an error for `status` with the status' default message and code.
    pub fn from_status(status: StatusCode) -> Self {
        let description = status.canonical_reason().unwrap_or("Unknown Error");
        Self::with_message(status, description)
    }

    /// Build an error for `status` with a custom message.
    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        let code = reason_code(status);
        let name = if code.ends_with("Error") {
            code.clone()
        } else {
            format!("{code}Error")
        };

        Self {
            name,
            status: status.as_u16(),
            message: message.into(),
            code,
        }
    }

    /// Override the machine code.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::NOT_FOUND, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::NOT_ACCEPTABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::NOT_IMPLEMENTED, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn loop_detected(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::LOOP_DETECTED, message)
    }

    /// Status as a typed code; unknown numbers degrade to 500.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// JSON object rendered as the error body.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "status": self.status,
            "message": self.message,
            "code": self.code,
        })
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for HttpError {}

/// Wraps any foreign error as an internal server error, keeping its message.
pub fn internal_from(error: impl std::error::Error) -> HttpError {
    HttpError::internal(error.to_string())
}

// "Not Found" → "NotFound", "I'm a teapot" → "ImATeapot"
fn reason_code(status: StatusCode) -> String {
    let description = status.canonical_reason().unwrap_or("Unknown Error");
    description
        .split_whitespace()
        .map(|piece| {
            let mut chars = piece.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<String>()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_codes_follow_reason_phrase() {
        let err = HttpError::not_found("missing");
        assert_eq!(err.name, "NotFoundError");
        assert_eq!(err.code, "NotFound");
        assert_eq!(err.status, 404);

        let err = HttpError::from_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.name, "InternalServerError");
        assert_eq!(err.code, "InternalServerError");
        assert_eq!(err.message, "Internal Server Error");

        let err = HttpError::from_status(StatusCode::IM_A_TEAPOT);
        assert_eq!(err.name, "ImATeapotError");
    }

    #[test]
    fn test_body_carries_all_fields() {
        let err = HttpError::not_implemented("nope").code("custom");
        assert_eq!(
            err.to_value(),
            serde_json::json!({
                "name": "NotImplementedError",
                "status": 501,
                "message": "nope",
                "code": "custom",
            })
        );
    }
}

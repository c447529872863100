//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, forward depth > 0)
//! - Detect conflicting mount entries
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HostConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::HostConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("collections.globs must contain at least one pattern")]
    NoGlobs,

    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("mount path {path:?} of collection {collection:?} must start with '/'")]
    RelativeMountPath { collection: String, path: String },

    #[error("collection {0:?} is mounted more than once")]
    DuplicateMount(String),

    #[error("invalid {field} address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &HostConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.collections.globs.is_empty() {
        errors.push(ValidationError::NoGlobs);
    }
    for pattern in &config.collections.globs {
        if let Err(e) = glob::Pattern::new(pattern) {
            errors.push(ValidationError::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.msg.to_string(),
            });
        }
    }

    let mut mounted = HashSet::new();
    for route in &config.routes {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::RelativeMountPath {
                collection: route.collection.clone(),
                path: route.path.clone(),
            });
        }
        if !mounted.insert(route.collection.to_lowercase()) {
            errors.push(ValidationError::DuplicateMount(route.collection.clone()));
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.dispatch.max_forward_depth == 0 {
        errors.push(ValidationError::Zero("dispatch.max_forward_depth"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the host.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// Root configuration for the collection host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Where collection manifests live and how they are watched.
    pub collections: CollectionsConfig,

    /// Mount paths per collection, in declaration order.
    pub routes: Vec<RouteConfig>,

    /// Dispatcher settings.
    pub dispatch: DispatchConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum accepted request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Collection discovery and hot reload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionsConfig {
    /// Base directory the glob patterns are resolved against.
    pub root: PathBuf,

    /// Glob patterns identifying manifest files.
    pub globs: Vec<String>,

    /// Logic module filename used when a manifest does not name one.
    pub default_logic: String,

    /// Watch collections for changes and reload them in place.
    pub watch: bool,

    /// Poll interval for the fallback polling watcher in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            globs: vec!["collections/**/collection.json".to_string()],
            default_logic: "logic.toml".to_string(),
            watch: true,
            poll_interval_ms: 2000,
        }
    }
}

/// Mount path of a single collection.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Collection name (normalized lowercase).
    pub collection: String,

    /// Path prefix the collection's endpoints are mounted under.
    pub path: String,
}

impl RouteConfig {
    pub fn new(collection: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            path: path.into(),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum number of forward hops within one request.
    pub max_forward_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_forward_depth: 16,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Route compilation.
//!
//! # Responsibilities
//! - Expand each collection's endpoint table (defaults + overrides)
//! - Join endpoints onto the collection's mount path
//! - Compile path patterns and report per-collection failures
//!
//! # Data Flow
//! ```text
//! CollectionMap + mount table ([[routes]] in declaration order)
//!     → endpoint table per collection
//!         defaults (list/one/create/update/delete) unless endpointsDefault = false
//!         manifest endpoints override, `false` deletes
//!     → Route { method, path, pattern, collection, handle }
//!     → RouteTable (first (method, path) wins)
//! ```
//!
//! # Design Decisions
//! - Deterministic: same collections and mounts always give the same routes
//! - A bad endpoint drops that collection's whole route set, never the others

use std::fmt;
use axum::http::Method;
use thiserror::Error;

use crate::collections::{Collection, CollectionMap, EndpointOverride};
use crate::config::RouteConfig;
use crate::events::{EventBus, HostEvent};
use crate::routing::pattern::PathPattern;
use crate::routing::table::RouteTable;

/// Conventional endpoints every collection gets unless `endpointsDefault` is false.
pub const DEFAULT_ENDPOINTS: [(&str, &str); 5] = [
    ("get /", "list"),
    ("get /:id", "one"),
    ("post /", "create"),
    ("delete /:id", "delete"),
    ("put /:id", "update"),
];

const METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("endpoint {0:?} has no method")]
    MissingMethod(String),

    #[error("endpoint {0:?} has no path")]
    MissingPath(String),

    #[error("endpoint {endpoint:?} uses unsupported method {method:?}")]
    UnknownMethod { endpoint: String, method: String },

    #[error("path {path:?} has invalid parameter name {name:?}")]
    InvalidParam { path: String, name: String },
}

/// Compiled dispatch unit.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub pattern: PathPattern,
    pub collection: String,
    pub handle: String,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | {}.{}",
            self.method.as_str().to_ascii_lowercase(),
            self.path,
            self.collection,
            self.handle
        )
    }
}

/// Turns loaded collections into routes.
pub struct RouteCompiler {
    mounts: Vec<RouteConfig>,
    events: EventBus,
}

impl RouteCompiler {
    pub fn new(mounts: Vec<RouteConfig>, events: EventBus) -> Self {
        Self { mounts, events }
    }

    /// Compile routes for every mounted, loaded collection, in mount order.
    pub fn compile(&self, collections: &CollectionMap) -> Vec<Route> {
        let mut routes = Vec::new();
        for mount in &self.mounts {
            // Collection names are normalized to lowercase.
            let Some(collection) = collections.get(&mount.collection.to_lowercase()) else {
                tracing::debug!(collection = %mount.collection, "Mounted collection is not loaded");
                continue;
            };
            match compile_collection(collection, &mount.path) {
                Ok(compiled) => routes.extend(compiled),
                Err(e) => self.events.error(format!(
                    "In collection \"{}\": {}. Skipping its routes...",
                    collection.name(),
                    e
                )),
            }
        }
        routes
    }

    /// Compile and index; emits `RoutesCompiled`.
    pub fn compile_table(&self, collections: &CollectionMap) -> RouteTable {
        let routes = self.compile(collections);
        let mut table = RouteTable::default();
        for route in routes {
            let description = route.to_string();
            if !table.insert(route) {
                self.events.warn(format!(
                    "Route \"{description}\" duplicates an earlier method and path, skipping..."
                ));
            }
        }
        self.events.emit(HostEvent::RoutesCompiled { count: table.len() });
        table
    }
}

/// Endpoint table after applying defaults and overrides, in insertion order.
pub fn endpoint_table(collection: &Collection) -> Vec<(String, String)> {
    let properties = &collection.descriptor.properties;
    let mut table: Vec<(String, String)> = Vec::new();

    if properties.endpoints_default {
        for (key, handle) in DEFAULT_ENDPOINTS {
            table.push((key.to_string(), handle.to_string()));
        }
    }

    for (key, value) in &properties.endpoints {
        let key = normalize_key(key);
        let position = table.iter().position(|(existing, _)| *existing == key);
        match (value, position) {
            (EndpointOverride::Disabled, Some(i)) => {
                table.remove(i);
            }
            (EndpointOverride::Disabled, None) => {}
            (EndpointOverride::Handle(handle), Some(i)) => table[i].1 = handle.clone(),
            (EndpointOverride::Handle(handle), None) => table.push((key, handle.clone())),
        }
    }
    table
}

fn compile_collection(collection: &Collection, mount: &str) -> Result<Vec<Route>, RouteError> {
    endpoint_table(collection)
        .into_iter()
        .map(|(endpoint, handle)| {
            let (method, path) = parse_endpoint(&endpoint)?;
            let path = join_paths(mount, path);
            let pattern = PathPattern::compile(&path)?;
            Ok(Route {
                method,
                path,
                pattern,
                collection: collection.name().to_string(),
                handle,
            })
        })
        .collect()
}

// "GET  /x" → "get /x"
fn normalize_key(key: &str) -> String {
    let mut parts = key.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => format!("{} {}", method.to_ascii_lowercase(), path),
        _ => key.trim().to_string(),
    }
}

fn parse_endpoint(endpoint: &str) -> Result<(Method, &str), RouteError> {
    let mut parts = endpoint.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RouteError::MissingMethod(endpoint.to_string()))?;
    let path = parts
        .next()
        .ok_or_else(|| RouteError::MissingPath(endpoint.to_string()))?;

    let upper = method.to_ascii_uppercase();
    let method = METHODS
        .iter()
        .find(|m| m.as_str() == upper)
        .cloned()
        .ok_or_else(|| RouteError::UnknownMethod {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        })?;
    Ok((method, path))
}

/// Join a mount path and an endpoint path, resolving `.`/`..` and dropping
/// the trailing slash (except for root).
pub fn join_paths(mount: &str, path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for piece in mount.split('/').chain(path.split('/')) {
        match piece {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            piece => segments.push(piece),
        }
    }
    format!("/{}", segments.join("/"))
}

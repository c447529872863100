//! Route table and its atomically swapped handle.
//!
//! # Responsibilities
//! - Index routes by method (ordered, first match wins)
//! - Index routes by `(collection, handle)` for forwarding
//! - Publish whole tables to concurrent readers
//!
//! # Design Decisions
//! - A table is immutable once published; reloads build a new one
//! - `ArcSwap` gives readers a consistent snapshot without locks
//! - `HEAD` falls back to `GET` routes when no `HEAD` route matches

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use arc_swap::ArcSwap;
use axum::http::Method;

use crate::dispatch::HttpError;
use crate::routing::compiler::Route;
use crate::routing::pattern::Params;

/// Indexed set of compiled routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    by_method: HashMap<Method, Vec<Arc<Route>>>,
    by_handle: HashMap<(String, String), Arc<Route>>,
    seen: HashSet<(Method, String)>,
    len: usize,
}

impl RouteTable {
    /// Build a table; later duplicates of a `(method, path)` are dropped.
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut table = Self::default();
        for route in routes {
            table.insert(route);
        }
        table
    }

    /// Append a route. Returns false if its `(method, path)` is already taken.
    pub fn insert(&mut self, route: Route) -> bool {
        if !self.seen.insert((route.method.clone(), route.path.to_ascii_lowercase())) {
            return false;
        }

        let route = Arc::new(route);
        self.by_handle
            .entry((route.collection.clone(), route.handle.clone()))
            .or_insert_with(|| route.clone());
        self.by_method
            .entry(route.method.clone())
            .or_default()
            .push(route);
        self.len += 1;
        true
    }

    /// First route matching `method` and `path`, with its parameters.
    pub fn find(&self, method: &Method, path: &str) -> Result<Option<(Arc<Route>, Params)>, HttpError> {
        if let Some(found) = self.scan(method, path)? {
            return Ok(Some(found));
        }
        if *method == Method::HEAD {
            return self.scan(&Method::GET, path);
        }
        Ok(None)
    }

    /// Route bound to a collection's handle.
    pub fn by_handle(&self, collection: &str, handle: &str) -> Option<Arc<Route>> {
        self.by_handle
            .get(&(collection.to_string(), handle.to_string()))
            .cloned()
    }

    /// Whether any route belongs to `collection`.
    pub fn has_collection(&self, collection: &str) -> bool {
        self.by_handle.keys().any(|(name, _)| name == collection)
    }

    /// Routes for a method in match order.
    pub fn routes(&self, method: &Method) -> &[Arc<Route>] {
        self.by_method.get(method).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn scan(&self, method: &Method, path: &str) -> Result<Option<(Arc<Route>, Params)>, HttpError> {
        for route in self.routes(method) {
            if let Some(params) = route.pattern.match_path(path)? {
                return Ok(Some((route.clone(), params)));
            }
        }
        Ok(None)
    }
}

/// Shared, swappable route table.
#[derive(Debug)]
pub struct Routes {
    current: ArcSwap<RouteTable>,
}

impl Routes {
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
        }
    }

    /// Snapshot used for one whole request.
    pub fn load(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Publish a freshly compiled table.
    pub fn store(&self, table: RouteTable) {
        self.current.store(Arc::new(table));
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::new(RouteTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::pattern::PathPattern;

    fn route(method: Method, path: &str, collection: &str, handle: &str) -> Route {
        Route {
            method,
            path: path.to_string(),
            pattern: PathPattern::compile(path).unwrap(),
            collection: collection.to_string(),
            handle: handle.to_string(),
        }
    }

    #[test]
    fn test_first_match_wins() {
        let table = RouteTable::new([
            route(Method::GET, "/widgets/new", "widgets", "form"),
            route(Method::GET, "/widgets/:id", "widgets", "one"),
        ]);

        let (found, _) = table.find(&Method::GET, "/widgets/new").unwrap().unwrap();
        assert_eq!(found.handle, "form");
        let (found, params) = table.find(&Method::GET, "/widgets/9").unwrap().unwrap();
        assert_eq!(found.handle, "one");
        assert_eq!(params["id"], "9");
        assert!(table.find(&Method::POST, "/widgets/9").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_method_and_path_is_rejected() {
        let mut table = RouteTable::default();
        assert!(table.insert(route(Method::GET, "/w", "a", "list")));
        assert!(!table.insert(route(Method::GET, "/W", "b", "list")));
        assert!(table.insert(route(Method::POST, "/w", "a", "create")));

        assert_eq!(table.len(), 2);
        assert!(table.by_handle("b", "list").is_none());
        assert_eq!(table.by_handle("a", "create").unwrap().method, Method::POST);
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let table = RouteTable::new([route(Method::GET, "/w", "a", "list")]);
        let (found, _) = table.find(&Method::HEAD, "/w").unwrap().unwrap();
        assert_eq!(found.handle, "list");
    }

    #[test]
    fn test_swap_keeps_old_snapshots() {
        let routes = Routes::default();
        let before = routes.load();
        routes.store(RouteTable::new([route(Method::GET, "/w", "a", "list")]));

        assert!(before.is_empty());
        assert_eq!(routes.load().len(), 1);
    }
}

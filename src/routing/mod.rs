//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (startup and every reload):
//!     CollectionMap + [[routes]] mount table
//!     → compiler.rs (endpoint tables, path joins)
//!     → pattern.rs (segment matchers)
//!     → table.rs (method index + forward index)
//!     → Routes::store (atomic swap)
//!
//! Incoming Request (method, path):
//!     → Routes::load (snapshot)
//!     → RouteTable::find (first match wins)
//!     → Return: route + params, or no match
//! ```
//!
//! # Design Decisions
//! - Routes are rebuilt whole and swapped, never patched in place
//! - No regex in the hot path (segment comparison only)
//! - Deterministic: same input always matches same route
//! - First match wins (mount order, then endpoint order)

pub mod compiler;
pub mod pattern;
pub mod table;

pub use compiler::{endpoint_table, join_paths, Route, RouteCompiler, RouteError, DEFAULT_ENDPOINTS};
pub use pattern::{Params, PathPattern};
pub use table::{RouteTable, Routes};

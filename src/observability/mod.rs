//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → EventBus::emit → logging.rs (host events as structured logs)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID comes from the HTTP layer and lands in TraceLayer spans
//! - Metrics are cheap and optional

pub mod logging;
pub mod metrics;

pub use self::logging::init_tracing;
pub use self::metrics::init_metrics;

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build host → ready → watch → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast
//!         → HttpServer stops accepting, drains in-flight requests
//!         → Reloader loop exits
//!         → CollectionWatcher::close
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when routes are compiled)
//! - A single broadcast reaches every long-running task

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;

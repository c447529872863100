//! Hot-reload subsystem.
//!
//! # Data Flow
//! ```text
//! notify (manifest roots)        notify (collection directories)
//!     → raw (change, path)           → raw (change, path)
//!     → manifest task                → directory task
//!         translate.rs                   translate.rs
//!         Added / Removed                ChangedLogic / Changed
//!     └──────────────┬───────────────────┘
//!                    → mpsc<WatchEvent>
//!                    → reloader.rs
//!                        loader.load_one / loader.remove
//!                        RouteCompiler → Routes::store
//! ```
//!
//! # Design Decisions
//! - The watcher never touches the route table; it only invalidates and signals
//! - Cached logic modules are invalidated before the event is sent
//! - State machine: Idle → Watching → Closed (no restart after close)

pub mod collection_watcher;
pub mod reloader;
pub mod translate;

pub use collection_watcher::{CollectionWatcher, WatchError, WatchState};
pub use reloader::Reloader;
pub use translate::{classify, FsChange, Translator};

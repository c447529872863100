//! Collection registry subsystem.
//!
//! # Data Flow
//! ```text
//! globs (collections/**/collection.json)
//!     → finder.rs (expand, parse, first-seen wins)
//!     → descriptor.rs (manifest → Descriptor)
//!     → loader.rs (Descriptor + resolver.rs → Collection)
//!     → Return: CollectionMap snapshot (Arc, swapped whole)
//! ```
//!
//! # Design Decisions
//! - Descriptors are immutable; a changed manifest produces a new one
//! - Discovery and loading report failures on the event bus and carry on
//! - Registry writes are serialized; reads are lock-free snapshots

pub mod descriptor;
pub mod finder;
pub mod loader;
pub mod resolver;

pub use descriptor::{is_valid_name, Descriptor, DescriptorError, EndpointOverride, Properties, MANIFEST_FILENAME};
pub use finder::{CollectionsFinder, DescriptorMap, DiscoveryError};
pub use loader::{Collection, CollectionMap, CollectionsLoader};
pub use resolver::{CompositeResolver, DeclarativeResolver, LoadError, ModuleResolver, StaticResolver};

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HostConfig (validated, immutable)
//!     → handed to the host builder, which passes slices of it to subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; collections reload, config does not
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CollectionsConfig, DispatchConfig, HostConfig, ListenerConfig, ObservabilityConfig,
    RouteConfig, TimeoutConfig,
};

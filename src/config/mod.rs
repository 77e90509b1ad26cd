//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs loads and validates the file again
//!     → route list sent to the server loop
//!     → new RouteTable generation swapped in between iterations
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the route table is hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, LogFormat, ObservabilityConfig, RouteConfig, ServerConfig, TransportConfig, ViewRef};
pub use watcher::ConfigWatcher;

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ManagerConfig (validated, immutable)
//!     → handed to startup, which builds every subsystem from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//!
//! This is the manager's own configuration. The probe's configuration,
//! which the manager fetches and distributes, lives in `store`.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ChildConfig;
pub use schema::ConflictPolicy;
pub use schema::ManagerConfig;
pub use schema::ReloadConfig;
pub use schema::RpcConfig;
pub use schema::SourceConfig;
pub use schema::StoreConfig;

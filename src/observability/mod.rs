//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!
//! Each reload runs in a `reload` span carrying a `reload_id`, so every event
//! of one fetch/persist/signal sequence can be correlated.
//! ```

pub mod logging;

pub use logging::init_logging;

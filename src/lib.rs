//! Probe manager library: supervises the probe daemon and reloads its
//! configuration on request.

pub mod config;
pub mod control;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod store;
pub mod supervisor;

use std::time::{SystemTime, UNIX_EPOCH};

pub use config::ManagerConfig;
pub use control::{ReloadService, RpcServer};
pub use lifecycle::{launch, Service, Shutdown, StartupError};

/// Seconds since the Unix epoch; times before it clamp to zero.
pub(crate) fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

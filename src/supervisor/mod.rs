//! Child process supervision.
//!
//! # Responsibilities
//! - Spawn the probe binary once at startup (fail fast if it cannot start)
//! - Track liveness without blocking (Running / Exited / Crashed)
//! - Deliver the reload signal to a live child
//! - Stop the child on shutdown
//!
//! # Design Decisions
//! - No automatic restart: a dead child stays dead until the service restarts
//! - Signals are fire-and-forget; the child has no way to acknowledge a reload
//! - Child stdout/stderr is forwarded into our log under `probe_manager::child`

use std::str::FromStr;

use nix::sys::signal::Signal;

pub mod handle;
pub mod process;

pub use handle::{ChildStatus, ProcessHandle, ProcessState};
pub use process::{SignalError, SpawnError, Supervisor};

/// Parse a signal name such as "SIGHUP" (the "SIG" prefix is optional).
pub fn parse_signal(name: &str) -> Option<Signal> {
    let name = name.trim().to_ascii_uppercase();
    if name.starts_with("SIG") {
        Signal::from_str(&name).ok()
    } else {
        Signal::from_str(&format!("SIG{}", name)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal() {
        assert_eq!(parse_signal("SIGHUP"), Some(Signal::SIGHUP));
        assert_eq!(parse_signal("usr1"), Some(Signal::SIGUSR1));
        assert_eq!(parse_signal("SIGWHATEVER"), None);
        assert_eq!(parse_signal(""), None);
    }
}

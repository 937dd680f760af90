//! Child process bookkeeping.
//!
//! # States
//! ```text
//! Running → Exited(code):     child returned from main
//! Running → Crashed(signal):  child was terminated by a signal
//! ```
//! There is no transition back to Running; a new child means a new handle.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::SystemTime;

use nix::sys::signal::Signal;
use serde::Serialize;

use crate::unix_secs;

/// Liveness of the supervised child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Exited { code: i32 },
    Crashed { signal: String },
}

impl ProcessState {
    pub fn from_exit(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ProcessState::Exited { code };
        }
        let signal = status
            .signal()
            .and_then(|raw| Signal::try_from(raw).ok())
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        ProcessState::Crashed { signal }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited { code } => write!(f, "exited with code {}", code),
            ProcessState::Crashed { signal } => write!(f, "killed by {}", signal),
        }
    }
}

/// What the supervisor knows about its child.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    /// OS process id. Stays meaningful only while `state` is Running.
    pub pid: u32,
    pub state: ProcessState,
    pub started_at: SystemTime,
    /// When the last reload signal was delivered.
    pub last_signal_at: Option<SystemTime>,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            state: ProcessState::Running,
            started_at: SystemTime::now(),
            last_signal_at: None,
        }
    }

    pub fn snapshot(&self) -> ChildStatus {
        ChildStatus {
            pid: self.pid,
            state: self.state.clone(),
            started_at: unix_secs(self.started_at),
            last_signal_at: self.last_signal_at.map(unix_secs),
        }
    }
}

/// Serializable view of a [`ProcessHandle`] for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChildStatus {
    pub pid: u32,
    #[serde(flatten)]
    pub state: ProcessState,
    pub started_at: u64,
    pub last_signal_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_maps_to_exited() {
        let status = ExitStatus::from_raw(3 << 8);
        assert_eq!(ProcessState::from_exit(status), ProcessState::Exited { code: 3 });
    }

    #[test]
    fn test_signal_maps_to_crashed() {
        let status = ExitStatus::from_raw(Signal::SIGSEGV as i32);
        assert_eq!(
            ProcessState::from_exit(status),
            ProcessState::Crashed {
                signal: "SIGSEGV".into()
            }
        );
    }

    #[test]
    fn test_status_json_shape() {
        let mut handle = ProcessHandle::new(42);
        handle.state = ProcessState::Exited { code: 1 };
        let json = serde_json::to_value(handle.snapshot()).unwrap();
        assert_eq!(json["pid"], 42);
        assert_eq!(json["state"], "exited");
        assert_eq!(json["code"], 1);
        assert!(json["last_signal_at"].is_null());
    }
}

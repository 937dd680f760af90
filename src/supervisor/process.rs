//! The supervised child process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::config::ChildConfig;
use crate::supervisor::handle::{ChildStatus, ProcessHandle, ProcessState};
use crate::supervisor::parse_signal;

/// The child could not be started. Fatal at startup.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {}: {source}", .binary.display())]
    Io {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited before its pid could be read", .0.display())]
    Vanished(PathBuf),

    #[error("unknown reload signal '{0}'")]
    UnknownSignal(String),
}

/// The reload signal could not be delivered.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("child not running ({0})")]
    NotRunning(ProcessState),

    #[error("failed to deliver {signal} to pid {pid}: {source}")]
    Delivery {
        signal: &'static str,
        pid: u32,
        #[source]
        source: nix::Error,
    },
}

/// Owns the child process for its whole life.
///
/// Only this type ever waits on the child, so the pid cannot be recycled by
/// the OS until `refresh` (or `shutdown`) has reaped it. Signals sent while
/// `state` is Running therefore always reach our child, even if it is
/// already a zombie.
#[derive(Debug)]
pub struct Supervisor {
    child: Option<Child>,
    handle: ProcessHandle,
    reload_signal: Signal,
}

impl Supervisor {
    /// Spawn the configured binary. Must be called within a Tokio runtime.
    pub fn start(config: &ChildConfig) -> Result<Self, SpawnError> {
        let reload_signal = parse_signal(&config.reload_signal)
            .ok_or_else(|| SpawnError::UnknownSignal(config.reload_signal.clone()))?;

        let mut command = Command::new(&config.binary);
        command.args(&config.args).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }
        if config.capture_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = command.spawn().map_err(|source| SpawnError::Io {
            binary: config.binary.clone(),
            source,
        })?;
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::Vanished(config.binary.clone()))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, pid, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, pid, "stderr"));
        }

        tracing::info!(
            pid,
            binary = %config.binary.display(),
            args = ?config.args,
            "Child process started"
        );

        Ok(Self {
            child: Some(child),
            handle: ProcessHandle::new(pid),
            reload_signal,
        })
    }

    /// Poll liveness without blocking, reaping the child if it has exited.
    pub fn refresh(&mut self) -> &ProcessState {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let state = ProcessState::from_exit(status);
                    tracing::warn!(pid = self.handle.pid, state = %state, "Child process exited");
                    self.handle.state = state;
                    self.child = None;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(pid = self.handle.pid, error = %e, "Failed to poll child process");
                }
            }
        }
        &self.handle.state
    }

    pub fn is_running(&mut self) -> bool {
        self.refresh().is_running()
    }

    /// Deliver the reload signal. Does not wait for the child to act on it.
    pub fn signal_reload(&mut self) -> Result<(), SignalError> {
        if !self.is_running() {
            return Err(SignalError::NotRunning(self.handle.state.clone()));
        }

        let pid = self.handle.pid;
        kill(Pid::from_raw(pid as i32), self.reload_signal).map_err(|source| {
            SignalError::Delivery {
                signal: self.reload_signal.as_str(),
                pid,
                source,
            }
        })?;

        self.handle.last_signal_at = Some(SystemTime::now());
        tracing::info!(pid, signal = self.reload_signal.as_str(), "Reload signal delivered");
        Ok(())
    }

    pub fn status(&mut self) -> ChildStatus {
        self.refresh();
        self.handle.snapshot()
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    /// SIGTERM, then SIGKILL once `grace` has passed.
    pub async fn shutdown(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = self.handle.pid;

        tracing::info!(pid, grace_secs = grace.as_secs(), "Stopping child process");
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::warn!(pid, error = %e, "Failed to send SIGTERM");
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                self.handle.state = ProcessState::from_exit(status);
            }
            Ok(Err(e)) => {
                tracing::error!(pid, error = %e, "Failed to wait for child process");
            }
            Err(_) => {
                tracing::warn!(pid, "Child ignored SIGTERM, killing");
                match child.kill().await {
                    Ok(()) => {
                        self.handle.state = ProcessState::Crashed {
                            signal: Signal::SIGKILL.as_str().to_string(),
                        };
                    }
                    Err(e) => tracing::error!(pid, error = %e, "Failed to kill child process"),
                }
            }
        }

        tracing::info!(pid, state = %self.handle.state, "Child process stopped");
    }
}

async fn forward_output<R>(stream: R, pid: u32, stream_name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::info!(target: "probe_manager::child", pid, stream = stream_name, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(target: "probe_manager::child", pid, stream = stream_name, error = %e, "Failed to read child output");
                break;
            }
        }
    }
}

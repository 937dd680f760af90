//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the manager.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the probe manager.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    /// RPC endpoint settings (bind address, path).
    pub rpc: RpcConfig,

    /// The supervised child process.
    pub child: ChildConfig,

    /// Where applied configuration is persisted.
    pub store: StoreConfig,

    /// Where configuration is fetched from.
    pub source: SourceConfig,

    /// Reload pipeline tuning.
    pub reload: ReloadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// RPC endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Bind address. Must be a loopback address.
    pub bind_address: String,

    /// HTTP path the JSON-RPC endpoint is mounted on.
    pub path: String,

    /// Upper bound on a single HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            path: "/RPC2".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Child process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChildConfig {
    /// Path to the probe binary.
    pub binary: PathBuf,

    /// Arguments passed to the binary.
    pub args: Vec<String>,

    /// Working directory for the child (defaults to ours).
    pub working_dir: Option<PathBuf>,

    /// Signal name delivered on reload, e.g. "SIGHUP".
    pub reload_signal: String,

    /// Forward the child's stdout/stderr into our log.
    pub capture_output: bool,

    /// Time between SIGTERM and SIGKILL on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for ChildConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("../probed/probed"),
            args: vec!["c".to_string()],
            working_dir: None,
            reload_signal: "SIGHUP".to_string(),
            capture_output: true,
            shutdown_grace_secs: 5,
        }
    }
}

impl ChildConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Configuration file read by the child.
    pub path: PathBuf,

    /// Largest accepted configuration blob in bytes.
    pub max_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("settings.xml"),
            max_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Central configuration authority.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Fetch with an HTTP GET.
    Http { url: String },
    /// Read a local file (useful for staging and tests).
    File { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Http {
            url: "http://127.0.0.1:8080/config".to_string(),
        }
    }
}

/// What to do with a reload request while another one is running.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Wait for the running reload to finish.
    #[default]
    Queue,
    /// Fail immediately with `Busy`.
    Reject,
}

/// Reload pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Behaviour for overlapping reload requests.
    pub on_conflict: ConflictPolicy,

    /// Per-attempt fetch deadline in seconds.
    pub fetch_timeout_secs: u64,

    /// Total fetch attempts (1 disables retries).
    pub fetch_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            on_conflict: ConflictPolicy::Queue,
            fetch_timeout_secs: 10,
            fetch_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2000,
        }
    }
}

impl ReloadConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

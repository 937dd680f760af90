//! Probe manager.
//!
//! Starts the probe daemon as a child process and exposes a loopback-only
//! JSON-RPC endpoint through which an operator asks it to fetch fresh
//! configuration from the central authority and reload.
//!
//! # Architecture Overview
//!
//! ```text
//!     probe-ctl / operator                 ┌──────────────────────────────────────┐
//!     ───────────────────── POST /RPC2 ───▶│ control::server → control::rpc      │
//!                                          │            │                         │
//!                                          │            ▼                         │
//!                                          │   control::reload (one at a time)    │
//!                                          │     │          │            │        │
//!     Central authority ◀── fetch ─────────┼─────┘          ▼            ▼        │
//!                                          │        store::persist   supervisor ──┼──▶ probed
//!                                          │        (settings.xml)   (SIGHUP)     │
//!                                          └──────────────────────────────────────┘
//! ```
//!
//! # Exit Codes
//! - 0: clean shutdown
//! - 1: bad configuration, child failed to start, or port could not be bound

use std::path::PathBuf;

use clap::Parser;

use probe_manager::config::{load_config, validation::validate_config, ConfigError, ManagerConfig};
use probe_manager::lifecycle::launch;
use probe_manager::observability::init_logging;

#[derive(Parser)]
#[command(name = "probe-manager")]
#[command(about = "Supervise the probe daemon and reload its configuration on demand", long_about = None)]
struct Cli {
    /// Path to the manager's TOML configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load(path: Option<&PathBuf>) -> Result<ManagerConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = ManagerConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("probe-manager: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.observability.log_level);
    tracing::info!("probe-manager v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.rpc.bind_address,
        path = %config.rpc.path,
        binary = %config.child.binary.display(),
        store = %config.store.path.display(),
        "Configuration loaded"
    );

    let service = match launch(config).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };

    if let Err(e) = service.run().await {
        tracing::error!(error = %e, "RPC server failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
}

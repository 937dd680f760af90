//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the configuration store
//! - Spawn the child process
//! - Bind the RPC listener and begin accepting calls
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The child starts before the port is bound, so a missing probe binary
//!   stops the service before it accepts a single call
//! - Subsystems initialize in order, not concurrently

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ManagerConfig;
use crate::control::{ReloadService, RpcServer};
use crate::lifecycle::signals::watch_signals;
use crate::lifecycle::Shutdown;
use crate::store::{source, ConfigStore, PersistError};
use crate::supervisor::{SpawnError, Supervisor};

/// Why the service could not start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration store: {0}")]
    Store(#[from] PersistError),

    #[error("child process: {0}")]
    Spawn(#[from] SpawnError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A started service: child running, port bound, not yet serving.
pub struct Service {
    config: ManagerConfig,
    reload: Arc<ReloadService>,
    listener: TcpListener,
    shutdown: Shutdown,
}

/// Bring every subsystem up in order: store, child, listener.
pub async fn launch(config: ManagerConfig) -> Result<Service, StartupError> {
    let store = ConfigStore::open(&config.store).await?;
    let source = source::from_config(&config.source, config.store.max_bytes);
    tracing::info!(source = %source.describe(), store = %store.path().display(), "Configuration store ready");

    let supervisor = Supervisor::start(&config.child)?;
    let reload = Arc::new(ReloadService::new(supervisor, store, source, &config.reload));

    let listener = match TcpListener::bind(&config.rpc.bind_address).await {
        Ok(listener) => listener,
        Err(source) => {
            reload.shutdown(config.child.shutdown_grace()).await;
            return Err(StartupError::Bind {
                addr: config.rpc.bind_address.clone(),
                source,
            });
        }
    };

    Ok(Service {
        config,
        reload,
        listener,
        shutdown: Shutdown::new(),
    })
}

impl Service {
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn reload_service(&self) -> Arc<ReloadService> {
        self.reload.clone()
    }

    /// Handle for stopping the service from outside.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until shutdown, then stop the child.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let Service {
            config,
            reload,
            listener,
            shutdown,
        } = self;

        let server_shutdown = shutdown.subscribe();
        if shutdown.is_triggered() {
            reload.shutdown(config.child.shutdown_grace()).await;
            return Ok(());
        }

        let signals = tokio::spawn({
            let reload = reload.clone();
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = watch_signals(reload, shutdown).await {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                }
            }
        });

        let server = RpcServer::new(&config.rpc, reload.clone());
        let served = server.run(listener, server_shutdown).await;

        shutdown.trigger();
        let _ = signals.await;
        reload.shutdown(config.child.shutdown_grace()).await;

        served
    }
}

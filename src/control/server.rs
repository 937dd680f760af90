//! HTTP server for the control endpoint.
//!
//! # Responsibilities
//! - Create Axum Router with the RPC and status handlers
//! - Wire up middleware (request timeout)
//! - Bind server to listener
//! - Stop accepting on shutdown
//!
//! Requests are not logged individually; reloads log themselves.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;

use crate::config::RpcConfig;
use crate::control::reload::{ReloadService, ServiceStatus};
use crate::control::rpc::{self, RpcResponse};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReloadService>,
}

/// The RPC server.
pub struct RpcServer {
    router: Router,
}

impl RpcServer {
    pub fn new(config: &RpcConfig, service: Arc<ReloadService>) -> Self {
        let state = AppState { service };
        Self {
            router: Self::build_router(config, state),
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &RpcConfig, state: AppState) -> Router {
        Router::new()
            .route(&config.path, post(rpc_handler))
            .route("/status", get(status_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
    }

    /// The router, for serving in-process (tests).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "RPC server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("RPC server draining");
            })
            .await?;

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Json<RpcResponse> {
    Json(rpc::handle_body(&state.service, &body).await)
}

async fn status_handler(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.service.status().await)
}

//! Control endpoint subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP POST /RPC2 (JSON-RPC 2.0)
//!     → server.rs (Axum, request timeout)
//!     → rpc.rs (parse, dispatch, introspection)
//!     → reload.rs (gate → liveness → fetch → persist → signal)
//!     → RpcResponse (1, or an error carrying the tagged outcome)
//!
//! SIGHUP to the manager
//!     → lifecycle/signals.rs
//!     → reload.rs (same gate)
//! ```
//!
//! # Design Decisions
//! - Bound to loopback only; there is no authentication
//! - One reload at a time; overlapping calls queue or get `Busy`
//! - The child is signaled fire-and-forget

pub mod reload;
pub mod rpc;
pub mod server;

pub use reload::{ReloadError, ReloadPhase, ReloadReport, ReloadResult, ReloadService, ServiceStatus};
pub use server::RpcServer;

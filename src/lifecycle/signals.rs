//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM/SIGINT → trigger graceful shutdown
//! - SIGHUP → run a reload, exactly as if `reload_config` had been called
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads go through the same gate as RPC reloads
//! - A reload in progress does not delay the handling of SIGTERM

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::control::{ReloadResult, ReloadService};
use crate::lifecycle::Shutdown;

/// A process signal the manager reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerSignal {
    Hangup,
    Terminate,
    Interrupt,
}

/// Translate process signals into shutdown and reload events until shutdown.
pub async fn watch_signals(
    service: Arc<ReloadService>,
    shutdown: Shutdown,
) -> Result<(), std::io::Error> {
    let mut stopped = shutdown.subscribe();
    if shutdown.is_triggered() {
        return Ok(());
    }
    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        let received = tokio::select! {
            _ = hangup.recv() => ManagerSignal::Hangup,
            _ = terminate.recv() => ManagerSignal::Terminate,
            _ = interrupt.recv() => ManagerSignal::Interrupt,
            _ = stopped.recv() => break,
        };
        if let ControlFlow::Break(()) = on_signal(&service, &shutdown, received) {
            break;
        }
    }

    Ok(())
}

/// React to one signal. Reloads run in the background; the returned handle
/// resolves to the outcome.
pub fn on_signal(
    service: &Arc<ReloadService>,
    shutdown: &Shutdown,
    received: ManagerSignal,
) -> ControlFlow<(), Option<JoinHandle<ReloadResult>>> {
    match received {
        ManagerSignal::Hangup => {
            tracing::info!("SIGHUP received, reloading");
            let service = service.clone();
            ControlFlow::Continue(Some(tokio::spawn(async move {
                service.reload("sighup").await
            })))
        }
        ManagerSignal::Terminate | ManagerSignal::Interrupt => {
            tracing::info!(signal = ?received, "Shutdown signal received");
            shutdown.trigger();
            ControlFlow::Break(())
        }
    }
}

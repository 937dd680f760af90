//! The reload pipeline.
//!
//! # State Machine
//! ```text
//! Idle → Fetching → Persisting → Signaling → Idle (Applied)
//!          │            │            │
//!          └────────────┴────────────┴──────→ Idle (Failed, nothing applied)
//! ```
//! A dead child fails the reload before Fetching. Identical content stops
//! after Fetching with Unchanged. A failed persist leaves the disk untouched;
//! a failed signal puts the previous revision back on disk before returning.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ConflictPolicy, ReloadConfig};
use crate::resilience::{retry, with_deadline, RetryPolicy};
use crate::store::{ConfigSource, ConfigStore, FetchError, PersistError, Prepared, RevisionSummary};
use crate::supervisor::{ChildStatus, ProcessState, SignalError, Supervisor};

/// Why a reload did not apply.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("child not running ({0})")]
    ChildNotRunning(ProcessState),

    #[error("another reload is in progress")]
    Busy,

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("persist failed: {0}")]
    Persist(#[from] PersistError),

    #[error("signal failed: {0}")]
    Signal(SignalError),

    #[error("reload task aborted: {0}")]
    Aborted(String),
}

impl ReloadError {
    /// Stable identifier used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ReloadError::ChildNotRunning(_) => "child_not_running",
            ReloadError::Busy => "busy",
            ReloadError::Fetch(_) => "fetch",
            ReloadError::Persist(_) => "persist",
            ReloadError::Signal(_) => "signal",
            ReloadError::Aborted(_) => "aborted",
        }
    }
}

impl From<SignalError> for ReloadError {
    fn from(err: SignalError) -> Self {
        match err {
            SignalError::NotRunning(state) => ReloadError::ChildNotRunning(state),
            other => ReloadError::Signal(other),
        }
    }
}

/// Outcome of one reload attempt.
#[derive(Debug)]
pub enum ReloadResult {
    Applied(RevisionSummary),
    Unchanged(RevisionSummary),
    Failed(ReloadError),
}

impl ReloadResult {
    /// Applied and Unchanged both leave the child on the latest config.
    pub fn is_success(&self) -> bool {
        !matches!(self, ReloadResult::Failed(_))
    }
}

/// Tagged, serializable form of a [`ReloadResult`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReloadReport {
    Applied { revision: RevisionSummary },
    Unchanged { revision: RevisionSummary },
    Failed { kind: &'static str, reason: String },
}

impl From<&ReloadResult> for ReloadReport {
    fn from(result: &ReloadResult) -> Self {
        match result {
            ReloadResult::Applied(rev) => ReloadReport::Applied {
                revision: rev.clone(),
            },
            ReloadResult::Unchanged(rev) => ReloadReport::Unchanged {
                revision: rev.clone(),
            },
            ReloadResult::Failed(err) => ReloadReport::Failed {
                kind: err.kind(),
                reason: err.to_string(),
            },
        }
    }
}

/// Where the pipeline currently is.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPhase {
    Idle = 0,
    Fetching = 1,
    Persisting = 2,
    Signaling = 3,
}

impl From<u8> for ReloadPhase {
    fn from(val: u8) -> Self {
        match val {
            1 => ReloadPhase::Fetching,
            2 => ReloadPhase::Persisting,
            3 => ReloadPhase::Signaling,
            _ => ReloadPhase::Idle,
        }
    }
}

/// Puts the phase back to Idle however the pipeline ends.
struct PhaseGuard<'a>(&'a AtomicU8);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(ReloadPhase::Idle as u8, Ordering::Release);
    }
}

/// Snapshot served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub child: ChildStatus,
    pub phase: ReloadPhase,
    pub revision: Option<RevisionSummary>,
}

/// Service context owning the child, the store and the source.
///
/// All reloads go through one gate, so at most one fetch/persist/signal
/// sequence runs at any time.
pub struct ReloadService {
    supervisor: Mutex<Supervisor>,
    store: ConfigStore,
    source: Arc<dyn ConfigSource>,
    gate: Mutex<()>,
    phase: AtomicU8,
    on_conflict: ConflictPolicy,
    retry: RetryPolicy,
    fetch_timeout: Duration,
}

impl ReloadService {
    pub fn new(
        supervisor: Supervisor,
        store: ConfigStore,
        source: Arc<dyn ConfigSource>,
        config: &ReloadConfig,
    ) -> Self {
        Self {
            supervisor: Mutex::new(supervisor),
            store,
            source,
            gate: Mutex::new(()),
            phase: AtomicU8::new(ReloadPhase::Idle as u8),
            on_conflict: config.on_conflict,
            retry: RetryPolicy::from(config),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn phase(&self) -> ReloadPhase {
        ReloadPhase::from(self.phase.load(Ordering::Acquire))
    }

    /// Run one reload. `trigger` names the caller for logs ("rpc", "sighup").
    ///
    /// The pipeline runs on its own task: dropping the returned future (a
    /// request timeout, a disconnected client) does not stop a reload that
    /// has already started.
    pub async fn reload(self: &Arc<Self>, trigger: &'static str) -> ReloadResult {
        let reload_id = Uuid::new_v4();
        let span = tracing::info_span!("reload", %reload_id, trigger);
        let service = Arc::clone(self);
        let task = tokio::spawn(async move { service.reload_gated().await }.instrument(span));

        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(%reload_id, error = %e, "Reload task failed");
                ReloadResult::Failed(ReloadError::Aborted(e.to_string()))
            }
        }
    }

    async fn reload_gated(&self) -> ReloadResult {
        let _gate = match self.on_conflict {
            ConflictPolicy::Queue => self.gate.lock().await,
            ConflictPolicy::Reject => match self.gate.try_lock() {
                Ok(gate) => gate,
                Err(_) => {
                    tracing::warn!("Reload rejected: another reload is in progress");
                    return ReloadResult::Failed(ReloadError::Busy);
                }
            },
        };

        tracing::info!("Reloading configuration");
        let result = {
            let _idle = PhaseGuard(&self.phase);
            self.run_pipeline().await
        };

        match &result {
            ReloadResult::Applied(rev) => {
                tracing::info!(version = rev.version, checksum = %rev.checksum, "Configuration applied")
            }
            ReloadResult::Unchanged(rev) => {
                tracing::info!(version = rev.version, "Configuration unchanged; child not signaled")
            }
            ReloadResult::Failed(err) => {
                tracing::error!(kind = err.kind(), error = %err, "Reload failed")
            }
        }
        result
    }

    async fn run_pipeline(&self) -> ReloadResult {
        {
            let mut supervisor = self.supervisor.lock().await;
            if !supervisor.is_running() {
                let state = supervisor.handle().state.clone();
                return ReloadResult::Failed(ReloadError::ChildNotRunning(state));
            }
        }

        self.set_phase(ReloadPhase::Fetching);
        let data = match self.fetch().await {
            Ok(data) => data,
            Err(e) => return ReloadResult::Failed(e.into()),
        };
        let rev = match self.store.prepare(data) {
            Ok(Prepared::Changed(rev)) => rev,
            Ok(Prepared::Unchanged(current)) => return ReloadResult::Unchanged(current.summary()),
            Err(e) => return ReloadResult::Failed(e.into()),
        };

        self.set_phase(ReloadPhase::Persisting);
        // a failed persist leaves the files as they were
        if let Err(e) = self.store.persist(&rev).await {
            return ReloadResult::Failed(e.into());
        }

        self.set_phase(ReloadPhase::Signaling);
        let signaled = self.supervisor.lock().await.signal_reload();
        if let Err(e) = signaled {
            self.rollback().await;
            return ReloadResult::Failed(e.into());
        }

        ReloadResult::Applied(self.store.commit(rev).summary())
    }

    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        let source = self.source.as_ref();
        let limit = self.fetch_timeout;
        retry(
            &self.retry,
            move |attempt| {
                tracing::debug!(attempt, source = %source.describe(), "Fetching configuration");
                with_deadline(limit, source.fetch(), FetchError::Timeout)
            },
            FetchError::is_retryable,
        )
        .await
    }

    async fn rollback(&self) {
        if let Err(e) = self.store.restore().await {
            tracing::error!(error = %e, "Failed to restore previous configuration");
        }
    }

    fn set_phase(&self, phase: ReloadPhase) {
        tracing::debug!(phase = ?phase, "Reload phase");
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub async fn status(&self) -> ServiceStatus {
        let child = self.supervisor.lock().await.status();
        ServiceStatus {
            child,
            phase: self.phase(),
            revision: self.store.current().map(|rev| rev.summary()),
        }
    }

    /// Wait for any in-flight reload, then stop the child.
    pub async fn shutdown(&self, grace: Duration) {
        let _gate = self.gate.lock().await;
        self.supervisor.lock().await.shutdown(grace).await;
    }
}

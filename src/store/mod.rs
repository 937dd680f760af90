//! Configuration store subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigSource::fetch (HTTP / file)
//!     → ConfigStore::prepare (non-empty, size limit, next version, unchanged?)
//!     → ConfigStore::persist (temp file → fsync → rename, then metadata)
//!     → [child is signaled]
//!     → ConfigStore::commit (publish as last applied)
//!
//! On signal failure:
//!     → ConfigStore::restore (previous revision back on disk)
//! ```
//!
//! # Invariant
//! The file on disk is the last applied revision, or does not exist.

pub mod persist;
pub mod revision;
pub mod source;

pub use persist::{ConfigStore, PersistError, Prepared};
pub use revision::{ConfigRevision, RevisionSummary};
pub use source::{ConfigSource, FetchError, FileConfigSource, HttpConfigSource};

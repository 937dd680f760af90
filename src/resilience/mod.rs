//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Fetch from the configuration authority:
//!     → retries.rs (deadline per attempt)
//!     → On failure: retries.rs (check if retryable, retry with backoff.rs)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for transport failures and 5xx responses

pub mod backoff;
pub mod retries;

pub use retries::{retry, with_deadline, RetryPolicy};

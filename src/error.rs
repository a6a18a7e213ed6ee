//! Error types for weak caches and the shared cleaner
//!
//! Provides unified error handling using thiserror.

use std::io;
use std::time::Duration;

use thiserror::Error;

// == WeakCache Error Enum ==
/// Unified error type for the crate.
///
/// Lookup misses are not errors; they surface as `None`.
#[derive(Error, Debug)]
pub enum WeakCacheError {
    /// A cleanup period of zero would spin the sweep worker
    #[error("Invalid cleanup period: {0:?}")]
    InvalidPeriod(Duration),

    /// The OS refused to start a sweep worker thread
    #[error("Failed to spawn cleaner worker for {period_ms}ms period: {source}")]
    WorkerSpawn {
        period_ms: u64,
        #[source]
        source: io::Error,
    },
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, WeakCacheError>;

//! weakcache - Weak-keyed caches and reentrancy guards for instrumentation code
//!
//! Provides caches whose entries never keep their keys alive, cleaned by a
//! single background worker per sweep period, and a per-thread call depth
//! guard that breaks recursive re-entry into intercepted code paths.

pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod supplier;
pub mod tasks;

pub use cache::WeakCache;
pub use config::CleanerConfig;
pub use error::{Result, WeakCacheError};
pub use guard::{CallDepth, CallDepthReset, GuardKey};
pub use supplier::{WeakConcurrentSupplier, WeakMapSupplier};

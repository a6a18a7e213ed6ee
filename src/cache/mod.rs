//! Cache Module
//!
//! Provides weak-keyed caches cleaned by the shared background sweeper.

mod key;
mod store;


// Re-export public types
pub use key::{KeyId, WeakKey};
pub use store::WeakCache;

// == Public Constants ==
/// Built-in sweep period, used when `WEAKCACHE_CLEAN_PERIOD_MS` is unset
pub const CLEAN_FREQUENCY: std::time::Duration =
    std::time::Duration::from_millis(crate::config::DEFAULT_CLEAN_PERIOD_MS);

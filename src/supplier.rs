//! Weak Map Supplier Module
//!
//! Lets instrumentation code obtain weak maps without knowing how they are
//! cleaned.

use std::time::Duration;

use crate::cache::WeakCache;
use crate::config::CleanerConfig;
use crate::error::{Result, WeakCacheError};

/// Factory for weak-keyed maps.
pub trait WeakMapSupplier {
    /// Returns a new, empty weak map.
    fn weak_map<K, V>(&self) -> WeakCache<K, V>
    where
        K: ?Sized + Send + Sync + 'static,
        V: Send + Sync + 'static;
}

// == Weak Concurrent Supplier ==
/// Hands out [`WeakCache`]s that all share one cleaner worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeakConcurrentSupplier {
    period: Duration,
}

impl WeakConcurrentSupplier {
    /// Supplier sweeping at the configured default period, the same one
    /// [`WeakCache::new`] uses.
    pub fn new() -> Self {
        Self {
            period: CleanerConfig::global().default_period,
        }
    }

    /// Supplier sweeping every `period`. Fails if `period` is zero.
    pub fn with_period(period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(WeakCacheError::InvalidPeriod(period));
        }
        Ok(Self { period })
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for WeakConcurrentSupplier {
    fn default() -> Self {
        Self::new()
    }
}

impl WeakMapSupplier for WeakConcurrentSupplier {
    fn weak_map<K, V>(&self) -> WeakCache<K, V>
    where
        K: ?Sized + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        WeakCache::registered_with(self.period)
    }
}

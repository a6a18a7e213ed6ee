//! Weak Cache Module
//!
//! Concurrent map whose keys are held weakly and whose stale entries are
//! removed by the shared background cleaner.

use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::ReentrantMutex;

use crate::cache::{KeyId, WeakKey};
use crate::config::CleanerConfig;
use crate::error::{Result, WeakCacheError};
use crate::tasks::{self, Expunge};

struct Inner<K: ?Sized, V> {
    /// Weak key to value storage
    entries: DashMap<WeakKey<K>, V>,
    /// Entries inserted minus entries removed, stale ones included.
    /// Briefly negative when a removal is counted before its insert.
    approximate_len: AtomicIsize,
    /// Serializes the slow path of `compute_if_absent`; reentrant so a
    /// supplier may compute other keys of the same cache
    compute_lock: ReentrantMutex<()>,
    period: Duration,
}

// == Weak Cache ==
/// A cache whose entries live only as long as their keys.
///
/// Keys are `Arc`s compared by identity and stored as `Weak`, so an entry
/// never keeps its key alive. Once the last strong reference to a key is
/// dropped, the entry goes stale and the shared cleaner removes it within a
/// few sweep periods.
///
/// Cloning is cheap and shares the same entries. When the last clone is
/// dropped the cache is freed and the cleaner forgets it.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use weakcache::WeakCache;
///
/// let cache: WeakCache<String, usize> = WeakCache::new();
/// let key = Arc::new("span".to_string());
///
/// assert_eq!(cache.compute_if_absent(&key, |k| k.len()), 4);
/// assert_eq!(cache.get(&key), Some(4));
///
/// cache.put(&key, None);
/// assert!(!cache.contains_key(&key));
/// ```
pub struct WeakCache<K: ?Sized, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> WeakCache<K, V>
where
    K: ?Sized + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache swept at the configured default period.
    pub fn new() -> Self {
        Self::registered_with(CleanerConfig::global().default_period)
    }

    /// Creates a cache swept every `period`.
    ///
    /// Fails if `period` is zero.
    pub fn with_period(period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(WeakCacheError::InvalidPeriod(period));
        }
        Ok(Self::registered_with(period))
    }

    /// Builds the cache and hands it to the cleaner; `period` must be non-zero.
    pub(crate) fn registered_with(period: Duration) -> Self {
        let inner = Arc::new(Inner {
            entries: DashMap::new(),
            approximate_len: AtomicIsize::new(0),
            compute_lock: ReentrantMutex::new(()),
            period,
        });
        tasks::schedule(&inner, period);
        Self { inner }
    }
}

impl<K: ?Sized, V> WeakCache<K, V> {
    // == Size ==
    /// Approximate number of entries.
    ///
    /// Stale entries count until the cleaner removes them. Never underflows
    /// when a `put` and a removal of the same key race.
    pub fn size(&self) -> usize {
        usize::try_from(self.inner.approximate_len.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Period at which the shared cleaner sweeps this cache.
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    // == Contains Key ==
    pub fn contains_key(&self, key: &Arc<K>) -> bool {
        self.inner.entries.contains_key(&KeyId::of(key))
    }

    // == Put ==
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// Passing `None` removes the mapping instead.
    pub fn put(&self, key: &Arc<K>, value: impl Into<Option<V>>) {
        match value.into() {
            Some(value) => self.inner.insert(key, value),
            None => {
                self.remove(key);
            }
        }
    }

    // == Remove ==
    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &Arc<K>) -> Option<V> {
        let (_, value) = self.inner.entries.remove(&KeyId::of(key))?;
        self.inner.approximate_len.fetch_sub(1, Ordering::Relaxed);
        Some(value)
    }

    // == Put If Absent ==
    /// Stores `value` only if `key` has no mapping yet.
    ///
    /// Callers that need the existing value should `get` first; the two
    /// calls are not atomic together.
    pub fn put_if_absent(&self, key: &Arc<K>, value: V) {
        let mut inserted = false;
        self.inner.entries.entry(WeakKey::new(key)).or_insert_with(|| {
            inserted = true;
            value
        });
        if inserted {
            self.inner.approximate_len.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops entries whose key has been reclaimed. Returns how many were removed.
    ///
    /// The shared cleaner calls this periodically; calling it directly is
    /// only needed when stale entries must go immediately.
    pub fn expunge_stale_entries(&self) -> usize {
        self.inner.expunge_stale()
    }
}

impl<K: ?Sized, V: Clone> WeakCache<K, V> {
    // == Get ==
    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &Arc<K>) -> Option<V> {
        self.inner
            .entries
            .get(&KeyId::of(key))
            .map(|entry| entry.value().clone())
    }

    // == Compute If Absent ==
    /// Returns the value for `key`, computing and storing it on a miss.
    ///
    /// `supplier` runs at most once per key even when many threads miss at
    /// the same time. Hits never block. Misses take a lock shared by the
    /// whole cache while the supplier runs. The lock is reentrant, so the
    /// supplier may itself call `compute_if_absent` on this cache.
    ///
    /// If `supplier` panics nothing is stored and the lock is released.
    pub fn compute_if_absent<F>(&self, key: &Arc<K>, supplier: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        match self.try_compute_if_absent(key, |k| Ok::<V, Infallible>(supplier(k))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`compute_if_absent`](Self::compute_if_absent).
    ///
    /// A supplier error is returned as-is and nothing is stored, so a later
    /// call retries the computation.
    pub fn try_compute_if_absent<F, E>(
        &self,
        key: &Arc<K>,
        supplier: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce(&K) -> std::result::Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let _guard = self.inner.compute_lock.lock();

        // Another thread may have finished computing while we waited
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = supplier(&**key)?;
        self.inner.insert(key, value.clone());
        Ok(value)
    }
}

impl<K: ?Sized, V> Inner<K, V> {
    fn insert(&self, key: &Arc<K>, value: V) {
        if self.entries.insert(WeakKey::new(key), value).is_none() {
            self.approximate_len.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn expunge_stale(&self) -> usize {
        let stale: Vec<KeyId> = self
            .entries
            .iter()
            .filter(|entry| entry.key().is_stale())
            .map(|entry| entry.key().id())
            .collect();

        let mut removed = 0;
        for id in stale {
            if let Some(entry) = self.entries.remove_if(&id, |key, _| key.is_stale()) {
                self.approximate_len.fetch_sub(1, Ordering::Relaxed);
                removed += 1;
                // Value drops here, outside the shard lock
                drop(entry);
            }
        }
        removed
    }
}

impl<K: ?Sized, V> Expunge for Inner<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn expunge_stale_entries(&self) -> usize {
        self.expunge_stale()
    }
}

impl<K, V> Default for WeakCache<K, V>
where
    K: ?Sized + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ?Sized, V> Clone for WeakCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ?Sized, V> fmt::Debug for WeakCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCache")
            .field("size", &self.size())
            .field("period", &self.inner.period)
            .finish()
    }
}

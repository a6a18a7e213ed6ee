//! Weak Key Module
//!
//! Identity-keyed weak handles used as map keys by `WeakCache`.

use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

// == Key Identity ==
/// Allocation address of a key.
///
/// A `Weak` keeps its allocation reserved even after the value is dropped,
/// so the address stays unique for as long as the owning `WeakKey` lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(usize);

impl KeyId {
    /// Identity of the allocation behind `key`.
    pub fn of<K: ?Sized>(key: &Arc<K>) -> Self {
        Self(Arc::as_ptr(key) as *const () as usize)
    }
}

// == Weak Key ==
/// A map key that does not keep its referent alive.
///
/// Equality and hashing go through [`KeyId`] only; `K` never needs to be
/// `Hash` or `Eq`.
pub struct WeakKey<K: ?Sized> {
    id: KeyId,
    referent: Weak<K>,
}

impl<K: ?Sized> WeakKey<K> {
    // == Constructor ==
    /// Creates a weak key for `key` without taking a strong reference.
    pub fn new(key: &Arc<K>) -> Self {
        Self {
            id: KeyId::of(key),
            referent: Arc::downgrade(key),
        }
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    // == Is Stale ==
    /// Returns true once every strong reference to the key is gone.
    pub fn is_stale(&self) -> bool {
        self.referent.strong_count() == 0
    }

    /// Upgrades to the key if it is still reachable.
    pub fn upgrade(&self) -> Option<Arc<K>> {
        self.referent.upgrade()
    }
}

impl<K: ?Sized> PartialEq for WeakKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K: ?Sized> Eq for WeakKey<K> {}

impl<K: ?Sized> Hash for WeakKey<K> {
    // Must hash exactly like `KeyId` for `Borrow<KeyId>` lookups
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<K: ?Sized> Borrow<KeyId> for WeakKey<K> {
    fn borrow(&self) -> &KeyId {
        &self.id
    }
}

impl<K: ?Sized> std::fmt::Debug for WeakKey<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakKey")
            .field("id", &self.id)
            .field("stale", &self.is_stale())
            .finish()
    }
}

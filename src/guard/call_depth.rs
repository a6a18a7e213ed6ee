//! Call Depth Module
//!
//! Per-thread counters that let an interception point notice it is already
//! running further up the same thread's stack.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

// == Guard Key ==
/// Identifies one logical guarded operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuardKey(Repr);

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Repr {
    Type(TypeId, &'static str),
    Named(&'static str),
}

impl GuardKey {
    /// Key derived from a type, e.g. the class whose method is intercepted.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Repr::Type(TypeId::of::<T>(), std::any::type_name::<T>()))
    }

    /// Key for an operation known by name, e.g. `"loadClass"`.
    pub const fn named(name: &'static str) -> Self {
        Self(Repr::Named(name))
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            Repr::Type(_, name) | Repr::Named(name) => name,
        }
    }
}

impl From<&'static str> for GuardKey {
    fn from(name: &'static str) -> Self {
        Self::named(name)
    }
}

impl fmt::Debug for GuardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GuardKey").field(&self.name()).finish()
    }
}

// == Call Depth Table ==
/// Depth per guard key for a single thread.
///
/// Entries appear on first increment and stay for the thread's lifetime.
#[derive(Debug, Default)]
pub struct CallDepthTable {
    depths: HashMap<GuardKey, usize>,
}

impl CallDepthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the depth for `key`, returning the value before.
    pub fn increment(&mut self, key: GuardKey) -> usize {
        let depth = self.depths.entry(key).or_insert(0);
        let previous = *depth;
        *depth += 1;
        previous
    }

    /// Decrements the depth for `key` without going below zero, returning the value after.
    pub fn decrement(&mut self, key: GuardKey) -> usize {
        match self.depths.get_mut(&key) {
            Some(depth) => {
                *depth = depth.saturating_sub(1);
                *depth
            }
            None => 0,
        }
    }

    pub fn reset(&mut self, key: GuardKey) {
        if let Some(depth) = self.depths.get_mut(&key) {
            *depth = 0;
        }
    }

    pub fn get(&self, key: GuardKey) -> usize {
        self.depths.get(&key).copied().unwrap_or(0)
    }
}

thread_local! {
    static CALL_DEPTHS: RefCell<CallDepthTable> = RefCell::new(CallDepthTable::new());
}

/// Runs `f` on this thread's table, or returns `fallback` once the table has
/// been torn down at thread exit.
fn with_table<R>(fallback: R, f: impl FnOnce(&mut CallDepthTable) -> R) -> R {
    CALL_DEPTHS
        .try_with(|table| f(&mut table.borrow_mut()))
        .unwrap_or(fallback)
}

// == Call Depth ==
/// Reentrancy guard keyed by thread and [`GuardKey`].
///
/// Usage: call [`increment`](Self::increment). A non-zero result means an
/// enclosing frame on this thread is already handling the operation, so
/// skip the guarded logic. Otherwise run it and [`reset`](Self::reset)
/// right after the decision point, not at the end of the whole operation,
/// so later legitimate nested calls are not suppressed.
/// [`enter`](Self::enter) packages that pattern with a reset-on-drop guard.
///
/// Re-entry through another thread is not detected. Forgetting to reset
/// leaves the operation skipped on that thread until reset is called.
/// During thread-local teardown every depth reads as zero and resets are
/// no-ops.
///
/// # Example
/// ```
/// use weakcache::{CallDepth, GuardKey};
///
/// const LOAD_CLASS: GuardKey = GuardKey::named("loadClass");
///
/// assert_eq!(CallDepth::increment(LOAD_CLASS), 0);
/// assert_eq!(CallDepth::increment(LOAD_CLASS), 1);
/// CallDepth::reset(LOAD_CLASS);
/// assert_eq!(CallDepth::increment(LOAD_CLASS), 0);
/// CallDepth::reset(LOAD_CLASS);
/// ```
pub struct CallDepth;

impl CallDepth {
    /// Increments this thread's depth for `key`, returning the depth before.
    pub fn increment(key: impl Into<GuardKey>) -> usize {
        let key = key.into();
        with_table(0, |table| table.increment(key))
    }

    /// Decrements this thread's depth for `key`, returning the depth after.
    pub fn decrement(key: impl Into<GuardKey>) -> usize {
        let key = key.into();
        with_table(0, |table| table.decrement(key))
    }

    /// Sets this thread's depth for `key` back to zero.
    pub fn reset(key: impl Into<GuardKey>) {
        let key = key.into();
        with_table((), |table| table.reset(key));
    }

    /// This thread's current depth for `key`.
    pub fn current(key: impl Into<GuardKey>) -> usize {
        let key = key.into();
        with_table(0, |table| table.get(key))
    }

    /// Increments and, if this is the outermost entry, returns a guard that
    /// resets the depth when dropped.
    ///
    /// Returns `None` for nested entries; the caller should skip its
    /// guarded logic.
    #[must_use = "dropping the guard resets the depth immediately"]
    pub fn enter(key: impl Into<GuardKey>) -> Option<CallDepthReset> {
        let key = key.into();
        if Self::increment(key) > 0 {
            return None;
        }
        Some(CallDepthReset { key })
    }
}

/// RAII guard returned by [`CallDepth::enter`].
#[derive(Debug)]
pub struct CallDepthReset {
    key: GuardKey,
}

impl CallDepthReset {
    pub fn key(&self) -> GuardKey {
        self.key
    }
}

impl Drop for CallDepthReset {
    fn drop(&mut self) {
        CallDepth::reset(self.key);
    }
}

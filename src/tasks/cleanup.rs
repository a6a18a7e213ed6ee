//! Shared Cleanup Task
//!
//! One background thread per sweep period that expunges stale entries from
//! every weakly registered target.
//!
//! Targets are only ever held through `Weak`, so registering with the
//! cleaner never keeps a cache alive. A target that has been reclaimed is
//! dropped from its sweep set on the next cycle.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::CleanerConfig;
use crate::error::{Result, WeakCacheError};
use crate::tasks::{SweepOutcome, SweepStats};

/// Something the cleaner can sweep.
pub trait Expunge: Send + Sync {
    /// Removes entries whose key has been reclaimed, returning how many went.
    fn expunge_stale_entries(&self) -> usize;
}

struct Registration {
    id: usize,
    target: Weak<dyn Expunge>,
}

struct SweepSet {
    period: Duration,
    registrations: Mutex<Vec<Registration>>,
    stats: Mutex<SweepStats>,
}

struct Schedule {
    sweep_set: Arc<SweepSet>,
    worker: Option<JoinHandle<()>>,
}

static SCHEDULES: Lazy<Mutex<HashMap<Duration, Schedule>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl SweepSet {
    fn new(period: Duration) -> Self {
        Self {
            period,
            registrations: Mutex::new(Vec::new()),
            stats: Mutex::new(SweepStats::new(period)),
        }
    }

    fn add(&self, id: usize, target: Weak<dyn Expunge>) -> bool {
        let mut registrations = self.registrations.lock();
        if registrations.iter().any(|r| r.id == id) {
            return false;
        }
        registrations.push(Registration { id, target });
        true
    }

    fn live_registrations(&self) -> usize {
        self.registrations
            .lock()
            .iter()
            .filter(|r| r.target.strong_count() > 0)
            .count()
    }

    // == Sweep ==
    /// Runs one cycle over a snapshot of the registrations.
    ///
    /// The registration lock is not held while targets expunge.
    fn sweep(&self) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        let targets: Vec<Weak<dyn Expunge>> = {
            let mut registrations = self.registrations.lock();
            let before = registrations.len();
            registrations.retain(|r| r.target.strong_count() > 0);
            outcome.dropped = before - registrations.len();
            registrations.iter().map(|r| Weak::clone(&r.target)).collect()
        };

        for target in targets {
            // Upgrade inside the closure so a final drop of the target is isolated too
            let result = panic::catch_unwind(AssertUnwindSafe(move || {
                target.upgrade().map(|t| t.expunge_stale_entries())
            }));

            match result {
                Ok(Some(removed)) => {
                    outcome.swept += 1;
                    outcome.expunged += removed;
                }
                Ok(None) => outcome.dropped += 1,
                Err(payload) => {
                    outcome.failures += 1;
                    warn!(
                        period_ms = self.period.as_millis() as u64,
                        "Cleaner: expunge panicked, will retry next cycle: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        self.stats.lock().record_cycle(&outcome);

        if outcome.expunged > 0 {
            debug!(
                "Cleaner ({}ms): removed {} stale entries from {} targets",
                self.period.as_millis(),
                outcome.expunged,
                outcome.swept
            );
        } else {
            trace!(
                "Cleaner ({}ms): no stale entries found",
                self.period.as_millis()
            );
        }

        outcome
    }
}

fn run_worker(sweep_set: Arc<SweepSet>) {
    info!(
        "Starting cleaner worker with period of {}ms",
        sweep_set.period.as_millis()
    );

    loop {
        thread::sleep(sweep_set.period);
        sweep_set.sweep();
    }
}

fn spawn_worker(sweep_set: Arc<SweepSet>) -> Result<JoinHandle<()>> {
    let period = sweep_set.period;
    thread::Builder::new()
        .name(CleanerConfig::global().thread_name(period))
        .spawn(move || run_worker(sweep_set))
        .map_err(|source| WeakCacheError::WorkerSpawn {
            period_ms: period.as_millis() as u64,
            source,
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Registers `target` to be swept every `period`.
///
/// The first registration for a period starts that period's worker thread;
/// later ones join its sweep set. Registering the same target again is a
/// no-op. Fails only for a zero period.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use weakcache::tasks::{self, Expunge};
///
/// struct Noop;
/// impl Expunge for Noop {
///     fn expunge_stale_entries(&self) -> usize {
///         0
///     }
/// }
///
/// let target = Arc::new(Noop);
/// tasks::register(&target, Duration::from_millis(900)).unwrap();
/// assert!(tasks::has_worker(Duration::from_millis(900)));
/// ```
pub fn register<T: Expunge + 'static>(target: &Arc<T>, period: Duration) -> Result<()> {
    if period.is_zero() {
        return Err(WeakCacheError::InvalidPeriod(period));
    }
    schedule(target, period);
    Ok(())
}

/// Registration for callers that already validated `period`.
pub(crate) fn schedule<T: Expunge + 'static>(target: &Arc<T>, period: Duration) {
    let id = Arc::as_ptr(target) as *const () as usize;
    let weak = Arc::downgrade(target);
    let weak: Weak<dyn Expunge> = weak;

    let mut schedules = SCHEDULES.lock();
    let schedule = schedules.entry(period).or_insert_with(|| Schedule {
        sweep_set: Arc::new(SweepSet::new(period)),
        worker: None,
    });

    if schedule.sweep_set.add(id, weak) {
        trace!("Cleaner: registered target for {}ms sweeps", period.as_millis());
    }

    // Spawned under the table lock, so a period never gets two workers
    if schedule.worker.is_none() {
        match spawn_worker(Arc::clone(&schedule.sweep_set)) {
            Ok(handle) => schedule.worker = Some(handle),
            Err(err) => warn!("Cleaner: {}; retrying on next registration", err),
        }
    }
}

/// Runs one sweep cycle for `period` on the calling thread.
///
/// Returns `None` when nothing was ever registered for that period.
pub fn sweep_now(period: Duration) -> Option<SweepOutcome> {
    let sweep_set = {
        let schedules = SCHEDULES.lock();
        Arc::clone(&schedules.get(&period)?.sweep_set)
    };
    Some(sweep_set.sweep())
}

/// Snapshot of the counters for `period`, if anything registered for it.
pub fn stats(period: Duration) -> Option<SweepStats> {
    let schedules = SCHEDULES.lock();
    let sweep_set = &schedules.get(&period)?.sweep_set;
    let mut stats = sweep_set.stats.lock().clone();
    stats.registered = sweep_set.live_registrations();
    Some(stats)
}

/// Number of running worker threads across all periods.
pub fn worker_count() -> usize {
    SCHEDULES
        .lock()
        .values()
        .filter(|s| s.worker.is_some())
        .count()
}

/// Returns true if a worker thread is sweeping at `period`.
pub fn has_worker(period: Duration) -> bool {
    SCHEDULES
        .lock()
        .get(&period)
        .map_or(false, |s| s.worker.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    struct Counting {
        calls: AtomicUsize,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Expunge for Counting {
        fn expunge_stale_entries(&self) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            1
        }
    }

    struct Panicking {
        armed: AtomicBool,
    }

    impl Expunge for Panicking {
        fn expunge_stale_entries(&self) -> usize {
            if self.armed.load(Ordering::SeqCst) {
                panic!("expunge exploded");
            }
            0
        }
    }

    // Long periods keep the background worker out of the way of sweep_now
    fn quiet_period(offset_ms: u64) -> Duration {
        Duration::from_secs(3600) + Duration::from_millis(offset_ms)
    }

    #[test]
    fn test_register_rejects_zero_period() {
        let target = Counting::new();
        let result = register(&target, Duration::ZERO);
        assert!(matches!(result, Err(WeakCacheError::InvalidPeriod(_))));
    }

    #[test]
    fn test_register_starts_one_worker_per_period() {
        let period = quiet_period(1);
        let targets: Vec<_> = (0..8).map(|_| Counting::new()).collect();
        for target in &targets {
            register(target, period).unwrap();
        }

        assert!(has_worker(period));
        assert_eq!(stats(period).unwrap().registered, 8);
    }

    #[test]
    fn test_duplicate_registration_swept_once() {
        let period = quiet_period(2);
        let target = Counting::new();
        register(&target, period).unwrap();
        register(&target, period).unwrap();

        assert_eq!(stats(period).unwrap().registered, 1);

        let outcome = sweep_now(period).unwrap();
        assert_eq!(outcome.swept, 1);
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dead_targets_are_dropped() {
        let period = quiet_period(3);
        let kept = Counting::new();
        let dropped = Counting::new();
        register(&kept, period).unwrap();
        register(&dropped, period).unwrap();
        drop(dropped);

        let outcome = sweep_now(period).unwrap();
        assert_eq!(outcome.swept, 1);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(stats(period).unwrap().registered, 1);
    }

    #[test]
    fn test_panicking_target_does_not_stop_others() {
        let period = quiet_period(4);
        let bad = Arc::new(Panicking {
            armed: AtomicBool::new(true),
        });
        let good = Counting::new();
        register(&bad, period).unwrap();
        register(&good, period).unwrap();

        let outcome = sweep_now(period).unwrap();
        assert_eq!(outcome.failures, 1);
        assert_eq!(outcome.swept, 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);

        let outcome = sweep_now(period).unwrap();
        assert_eq!(outcome.failures, 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 2);

        bad.armed.store(false, Ordering::SeqCst);
        let outcome = sweep_now(period).unwrap();
        assert_eq!(outcome.failures, 0);
        assert_eq!(outcome.swept, 2);

        let stats = stats(period).unwrap();
        assert_eq!(stats.failures, 2);
        assert!(stats.cycles >= 3);
    }

    #[test]
    fn test_sweep_now_unknown_period() {
        assert!(sweep_now(quiet_period(999)).is_none());
        assert!(stats(quiet_period(999)).is_none());
    }

    #[test]
    fn test_worker_sweeps_in_background() {
        let period = Duration::from_millis(20);
        let target = Counting::new();
        register(&target, period).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while target.calls.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(target.calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}

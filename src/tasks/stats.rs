//! Sweep Statistics Module
//!
//! Tracks what the background cleaner did for one sweep period.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Sweep Stats ==
/// Counters for the cleaner worker of a single period.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepStats {
    /// Sweep period in milliseconds
    pub period_ms: u64,
    /// Number of completed sweep cycles
    pub cycles: u64,
    /// Total stale entries removed across all targets
    pub expunged: u64,
    /// Number of target expunges that panicked
    pub failures: u64,
    /// Registrations whose target is still alive
    pub registered: usize,
    /// When the last cycle finished
    pub last_sweep_at: Option<DateTime<Utc>>,
}

impl SweepStats {
    // == Constructor ==
    /// Creates zeroed stats for `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            period_ms: period.as_millis() as u64,
            ..Self::default()
        }
    }

    // == Record Cycle ==
    /// Folds the outcome of one sweep cycle into the counters.
    pub fn record_cycle(&mut self, outcome: &SweepOutcome) {
        self.cycles += 1;
        self.expunged += outcome.expunged as u64;
        self.failures += outcome.failures as u64;
        self.registered = outcome.swept + outcome.failures;
        self.last_sweep_at = Some(Utc::now());
    }
}

// == Sweep Outcome ==
/// Result of a single sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    /// Targets expunged without panicking
    pub swept: usize,
    /// Stale entries removed
    pub expunged: usize,
    /// Targets whose expunge panicked
    pub failures: usize,
    /// Registrations dropped because their target was reclaimed
    pub dropped: usize,
}

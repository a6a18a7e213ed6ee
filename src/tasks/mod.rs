//! Background Tasks Module
//!
//! Contains the shared cleaner that sweeps weakly registered caches.
//!
//! # Tasks
//! - Stale entry cleanup: one worker thread per distinct sweep period,
//!   shared by every cache registered with that period

mod cleanup;
mod stats;

pub use cleanup::{has_worker, register, stats, sweep_now, worker_count, Expunge};
pub(crate) use cleanup::schedule;
pub use stats::{SweepOutcome, SweepStats};

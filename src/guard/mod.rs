//! Guard Module
//!
//! Reentrancy detection for interception points that may call back into
//! themselves on the same thread.

mod call_depth;

pub use call_depth::{CallDepth, CallDepthReset, CallDepthTable, GuardKey};

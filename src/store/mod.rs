//! Reducer-style state transitions for a scan request.
//!
//! The reducer is pure: it never performs IO and never fails. Side effects
//! (debits, analysis calls, store writes, refunds) are issued by the engine
//! around it.

mod action;
pub mod reducer;

pub use action::{CaptureAction, LifecycleAction, ProcessAction, ReviewAction, ScanAction};
pub use reducer::reduce;

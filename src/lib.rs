//! Crash-safe lifecycle engine for turning receipt photos into reviewed
//! expense records.
//!
//! - [`store`] holds the pure reducer over [`domain::ScanRequest`].
//! - [`application::scan`] owns the per-user engine, the batch coordinator
//!   and the navigation guard.
//! - [`infra`] provides persistence, configuration and collaborator seams.

pub mod application;
pub mod domain;
pub mod infra;
pub mod store;

pub use application::scan::{ScanEngine, ScanServices, StartOutcome};

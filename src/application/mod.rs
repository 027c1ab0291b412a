//! Application layer (use-cases, policies).
//!
//! Orchestrates the scan request reducer and its external collaborators
//! without depending on any particular UI or storage technology.

pub mod scan;

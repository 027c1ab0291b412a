//! Scan request use-cases: the engine owning a user's request, the batch
//! coordinator, post-scan review checks and the navigation guard.

pub mod batch;
pub mod checks;
pub mod engine;
pub mod navigation;

pub use batch::{BatchCoordinator, BatchOutcome, BatchReport};
pub use checks::next_review_dialog;
pub use engine::{ScanEngine, ScanServices, StartOutcome};
pub use navigation::{BackOutcome, BlockingSource, NavigationGuard, Surface};

#[cfg(test)]
mod tests;

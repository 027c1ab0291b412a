//! Domain error types for the scan lifecycle.
//!
//! These are the failures reported by the external collaborators (vision
//! analysis, expense store, credit ledger) and by snapshot decoding. None of
//! them escape an engine operation: the engine folds them into the request
//! state as a human-readable message.

use thiserror::Error;

/// Failures reported by the receipt analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("No receipt could be read from the image: {0}")]
    Unreadable(String),

    #[error("Image rejected by the analysis service: {0}")]
    Rejected(String),

    #[error("Analysis timed out")]
    Timeout,

    #[error("Analysis service error: {0}")]
    Service(String),
}

/// Failures reported by the durable expense store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Expense record rejected: {0}")]
    Rejected(String),

    #[error("Expense store unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by the credit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Not enough scan credits: {required} required, {available} available")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Credit ledger unavailable: {0}")]
    Unavailable(String),
}

/// Reasons a persisted snapshot cannot be turned back into a request.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Snapshot belongs to another user: {0}")]
    ForeignUser(String),

    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

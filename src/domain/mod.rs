//! Domain types for receipt scanning.
//! Defines the scan request aggregate, parsed receipts, review dialogs and collaborator errors.

pub mod dialog;
pub mod error;
pub mod receipt;
pub mod scan;

pub use dialog::*;
pub use error::*;
pub use receipt::*;
pub use scan::*;

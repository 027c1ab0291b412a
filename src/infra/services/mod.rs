//! External collaborators of the scan engine.
//!
//! The analysis service, expense store and credit ledger live outside this
//! crate; only their interfaces and in-memory stand-ins are defined here.

pub mod memory;
pub mod traits;

pub use memory::{InMemoryExpenseStore, InMemoryLedger, LedgerEntry};
pub use traits::{CreditLedger, ExpenseStore, ReceiptAnalyzer};

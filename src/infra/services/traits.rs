use async_trait::async_trait;

use crate::domain::{
    AnalysisError, ExpenseRecord, ImagePayload, LedgerError, ParsedReceipt, RecordId, StoreError,
};

/// Remote vision service turning a photo into a structured receipt.
///
/// Implementations must not retry internally; retries are a user decision.
#[async_trait]
pub trait ReceiptAnalyzer: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> Result<ParsedReceipt, AnalysisError>;
}

/// Durable store for reviewed expenses.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn save(&self, record: &ExpenseRecord) -> Result<RecordId, StoreError>;
}

/// Per-user scan credit balance.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn debit(&self, user_id: &str, amount: u32) -> Result<(), LedgerError>;
    async fn credit(&self, user_id: &str, amount: u32) -> Result<(), LedgerError>;
}

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::scan::{RequestId, UserId};

/// Identifier handed back by the expense store.
pub type RecordId = String;

/// One line of a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
}

fn one() -> Decimal {
    Decimal::ONE
}

impl ReceiptItem {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// Structured data extracted from a single receipt image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedReceipt {
    pub merchant: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// ISO 4217 code as printed on the receipt, if the service detected one.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
    pub total: Decimal,
    #[serde(default)]
    pub tax: Option<Decimal>,
    /// Service confidence in `0.0..=1.0`.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl ParsedReceipt {
    /// Sum of all line totals.
    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(ReceiptItem::line_total).sum()
    }

    /// Whether the printed total disagrees with the sum of the items.
    ///
    /// Receipts without items cannot disagree. Tax is allowed to account for
    /// the difference when the items are listed net of tax.
    pub fn has_total_mismatch(&self, tolerance: Decimal) -> bool {
        if self.items.is_empty() {
            return false;
        }
        let items_total = self.items_total();
        let gross = items_total + self.tax.unwrap_or_default();
        (self.total - items_total).abs() > tolerance && (self.total - gross).abs() > tolerance
    }

    pub fn apply(&mut self, patch: ResultPatch) {
        if let Some(merchant) = patch.merchant {
            self.merchant = merchant;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(currency) = patch.currency {
            self.currency = currency;
        }
        if let Some(items) = patch.items {
            self.items = items;
        }
        if let Some(total) = patch.total {
            self.total = total;
        }
        if let Some(tax) = patch.tax {
            self.tax = tax;
        }
    }
}

/// Field-level edit of a parsed receipt made during review.
///
/// `None` leaves a field untouched; for optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPatch {
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub currency: Option<Option<String>>,
    #[serde(default)]
    pub items: Option<Vec<ReceiptItem>>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub tax: Option<Option<Decimal>>,
}

impl ResultPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// The reviewed receipt as handed to the durable expense store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    pub request_id: RequestId,
    pub user_id: UserId,
    /// Position of the receipt within the request's results.
    pub source_index: usize,
    pub receipt: ParsedReceipt,
    pub created_at: DateTime<Utc>,
}

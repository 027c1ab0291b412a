use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A modal decision pending on top of a scan request.
///
/// Dialogs are an overlay: they never change the request phase, and their
/// presence alone is what makes the scan surface block back-navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActiveDialog {
    /// The receipt currency differs from the user's default currency.
    #[serde(rename_all = "camelCase")]
    CurrencyMismatch {
        result_index: usize,
        detected: String,
        expected: String,
    },
    /// The printed total disagrees with the sum of the line items.
    #[serde(rename_all = "camelCase")]
    TotalMismatch {
        result_index: usize,
        receipt_total: Decimal,
        items_total: Decimal,
    },
    /// One-tap confirmation before saving a single receipt.
    #[serde(rename_all = "camelCase")]
    QuickConfirm { result_index: usize },
    /// Outcome of a finished batch.
    #[serde(rename_all = "camelCase")]
    CompletionSummary { succeeded: usize, failed: usize },
}

impl ActiveDialog {
    pub fn kind(&self) -> DialogKind {
        match self {
            Self::CurrencyMismatch { .. } => DialogKind::CurrencyMismatch,
            Self::TotalMismatch { .. } => DialogKind::TotalMismatch,
            Self::QuickConfirm { .. } => DialogKind::QuickConfirm,
            Self::CompletionSummary { .. } => DialogKind::CompletionSummary,
        }
    }

    /// The result the dialog is about, if it concerns a single receipt.
    pub fn result_index(&self) -> Option<usize> {
        match self {
            Self::CurrencyMismatch { result_index, .. }
            | Self::TotalMismatch { result_index, .. }
            | Self::QuickConfirm { result_index } => Some(*result_index),
            Self::CompletionSummary { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DialogKind {
    CurrencyMismatch,
    TotalMismatch,
    QuickConfirm,
    CompletionSummary,
}

impl fmt::Display for DialogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrencyMismatch => write!(f, "currency-mismatch"),
            Self::TotalMismatch => write!(f, "total-mismatch"),
            Self::QuickConfirm => write!(f, "quick-confirm"),
            Self::CompletionSummary => write!(f, "completion-summary"),
        }
    }
}

/// The user's answer to an [`ActiveDialog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "choice", content = "value", rename_all = "kebab-case")]
pub enum DialogResolution {
    /// Record the receipt in the given currency instead of the detected one.
    UseCurrency(String),
    KeepDetectedCurrency,
    /// Replace the printed total with the sum of the line items.
    UseItemsTotal,
    KeepReceiptTotal,
    /// Save right away.
    Confirm,
    /// Keep reviewing instead of saving.
    Edit,
    Acknowledge,
}

impl DialogResolution {
    /// The dialog kind this resolution answers.
    pub fn kind(&self) -> DialogKind {
        match self {
            Self::UseCurrency(_) | Self::KeepDetectedCurrency => DialogKind::CurrencyMismatch,
            Self::UseItemsTotal | Self::KeepReceiptTotal => DialogKind::TotalMismatch,
            Self::Confirm | Self::Edit => DialogKind::QuickConfirm,
            Self::Acknowledge => DialogKind::CompletionSummary,
        }
    }
}

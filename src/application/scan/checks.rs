use crate::domain::{ActiveDialog, DialogKind, ParsedReceipt};
use crate::infra::app_config::ScanConfig;

/// Order in which review checks are offered after a single scan.
const CHECK_ORDER: [DialogKind; 3] = [
    DialogKind::CurrencyMismatch,
    DialogKind::TotalMismatch,
    DialogKind::QuickConfirm,
];

/// First applicable review dialog for `receipt`, considering only checks
/// that come after `after` (all checks when `None`).
pub fn next_review_dialog(
    receipt: &ParsedReceipt,
    result_index: usize,
    config: &ScanConfig,
    after: Option<DialogKind>,
) -> Option<ActiveDialog> {
    let skip = after
        .and_then(|kind| CHECK_ORDER.iter().position(|k| *k == kind))
        .map_or(0, |pos| pos + 1);

    CHECK_ORDER
        .iter()
        .skip(skip)
        .find_map(|kind| check(*kind, receipt, result_index, config))
}

fn check(
    kind: DialogKind,
    receipt: &ParsedReceipt,
    result_index: usize,
    config: &ScanConfig,
) -> Option<ActiveDialog> {
    match kind {
        DialogKind::CurrencyMismatch => {
            let detected = receipt.currency.as_deref()?.trim();
            let expected = config.default_currency.trim();
            (!detected.is_empty() && !detected.eq_ignore_ascii_case(expected)).then(|| {
                ActiveDialog::CurrencyMismatch {
                    result_index,
                    detected: detected.to_uppercase(),
                    expected: expected.to_uppercase(),
                }
            })
        }
        DialogKind::TotalMismatch => receipt
            .has_total_mismatch(config.total_tolerance)
            .then(|| ActiveDialog::TotalMismatch {
                result_index,
                receipt_total: receipt.total,
                items_total: receipt.items_total(),
            }),
        DialogKind::QuickConfirm => config
            .quick_confirm
            .then_some(ActiveDialog::QuickConfirm { result_index }),
        DialogKind::CompletionSummary => None,
    }
}

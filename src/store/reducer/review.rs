use crate::domain::{ActiveDialog, DialogResolution, ScanPhase, ScanRequest};

use super::super::action::ReviewAction;

/// Whether the reviewed results may be handed to the store.
pub fn can_begin_save(state: &ScanRequest) -> bool {
    (state.phase == ScanPhase::Reviewing || state.is_save_failure())
        && state.active_dialog.is_none()
        && !state.results.is_empty()
}

pub fn reduce(state: &ScanRequest, action: ReviewAction) -> ScanRequest {
    match action {
        ReviewAction::ShowDialog(dialog) => {
            if !matches!(state.phase, ScanPhase::Reviewing | ScanPhase::Error)
                || state.active_dialog.is_some()
            {
                return state.clone();
            }
            if let Some(index) = dialog.result_index()
                && index >= state.results.len()
            {
                return state.clone();
            }
            let mut next = state.clone();
            next.active_dialog = Some(dialog);
            next
        }
        ReviewAction::ResolveDialog { kind, resolution } => {
            let Some(active) = state.active_dialog.as_ref() else {
                return state.clone();
            };
            if active.kind() != kind || resolution.kind() != kind {
                return state.clone();
            }
            let mut next = state.clone();
            apply_resolution(&mut next, active, resolution);
            next.active_dialog = None;
            next
        }
        ReviewAction::DismissDialog => {
            if state.active_dialog.is_none() {
                return state.clone();
            }
            let mut next = state.clone();
            next.active_dialog = None;
            next
        }
        ReviewAction::UpdateResult { index, patch } => {
            if state.phase != ScanPhase::Reviewing
                || state.active_dialog.is_some()
                || index >= state.results.len()
            {
                return state.clone();
            }
            let mut next = state.clone();
            next.results[index].apply(patch);
            next
        }
        ReviewAction::SaveStarted => {
            if !can_begin_save(state) {
                return state.clone();
            }
            let mut next = state.clone();
            next.phase = ScanPhase::Saving;
            next.error = None;
            next
        }
        ReviewAction::SaveSucceeded => {
            if state.phase != ScanPhase::Saving {
                return state.clone();
            }
            ScanRequest::default()
        }
        ReviewAction::SaveFailed { message, saved } => {
            if state.phase != ScanPhase::Saving {
                return state.clone();
            }
            if saved >= state.results.len() {
                return ScanRequest::default();
            }
            let mut next = state.clone();
            next.results.drain(..saved);
            next.phase = ScanPhase::Error;
            next.error = Some(message);
            next
        }
    }
}

fn apply_resolution(next: &mut ScanRequest, active: &ActiveDialog, resolution: DialogResolution) {
    let Some(receipt) = active
        .result_index()
        .and_then(|index| next.results.get_mut(index))
    else {
        return;
    };
    match resolution {
        DialogResolution::UseCurrency(currency) => {
            receipt.currency = Some(currency.trim().to_uppercase());
        }
        DialogResolution::UseItemsTotal => {
            receipt.total = receipt.items_total();
        }
        DialogResolution::KeepDetectedCurrency
        | DialogResolution::KeepReceiptTotal
        | DialogResolution::Confirm
        | DialogResolution::Edit
        | DialogResolution::Acknowledge => {}
    }
}

use crate::domain::{
    BatchFailure, BatchProgress, BatchSuccess, CreditState, ScanMode, ScanPhase, ScanRequest,
};

use super::super::action::ProcessAction;

/// Whether a processing attempt (and therefore a debit) may begin.
pub fn can_begin(state: &ScanRequest) -> bool {
    (state.phase == ScanPhase::Capturing || state.is_scan_failure())
        && !state.images.is_empty()
        && state.mode != ScanMode::Statement
        && state.credit_state != CreditState::Confirmed
}

/// Scanning with the credit reserved and no analysis started yet.
fn awaiting_debit(state: &ScanRequest) -> bool {
    state.phase == ScanPhase::Scanning
        && state.credit_state == CreditState::Reserved
        && state.results.is_empty()
        && state
            .batch_progress
            .as_ref()
            .is_none_or(|p| p.started.is_empty())
}

/// Credits a processing attempt costs: one per analysed image.
pub fn credits_for(state: &ScanRequest) -> u32 {
    match state.mode {
        ScanMode::Batch => state.images.len() as u32,
        ScanMode::Single | ScanMode::Statement => 1,
    }
}

pub fn reduce(state: &ScanRequest, action: ProcessAction) -> ScanRequest {
    match action {
        ProcessAction::Start { credits } => {
            if !can_begin(state) {
                return state.clone();
            }
            let mut next = state.clone();
            next.phase = ScanPhase::Scanning;
            next.error = None;
            next.active_dialog = None;
            next.results.clear();
            next.credit_state = CreditState::Reserved;
            next.credits_charged = credits;
            next.batch_progress =
                (next.mode == ScanMode::Batch).then(|| BatchProgress::new(next.images.len()));
            next
        }
        ProcessAction::Rejected(message) => {
            if !awaiting_debit(state) {
                return state.clone();
            }
            // The reservation is released without a ledger call.
            let mut next = state.clone();
            next.phase = ScanPhase::Error;
            next.error = Some(message);
            next.credit_state = CreditState::Refunded;
            next.credits_charged = 0;
            next.batch_progress = None;
            next
        }
        ProcessAction::ItemStarted(index) => update_progress(state, index, |progress| {
            progress.started.insert(index)
        }),
        ProcessAction::ItemSucceeded { index, receipt } => {
            let mut next = update_progress(state, index, |progress| {
                if progress.is_settled(index) {
                    return false;
                }
                progress.started.insert(index);
                let pos = progress.succeeded.partition_point(|s| s.index < index);
                progress
                    .succeeded
                    .insert(pos, BatchSuccess { index, receipt });
                true
            });
            if next != *state && next.credit_state == CreditState::Reserved {
                next.credit_state = CreditState::Confirmed;
            }
            next
        }
        ProcessAction::ItemFailed { index, message } => update_progress(state, index, |progress| {
            if progress.is_settled(index) {
                return false;
            }
            progress.started.insert(index);
            let pos = progress.failed.partition_point(|f| f.index < index);
            progress.failed.insert(pos, BatchFailure { index, message });
            true
        }),
        ProcessAction::Succeeded(results) => {
            if state.phase != ScanPhase::Scanning || results.is_empty() {
                return state.clone();
            }
            let mut next = state.clone();
            next.phase = ScanPhase::Reviewing;
            next.results = results;
            next.error = None;
            if next.credit_state == CreditState::Reserved {
                next.credit_state = CreditState::Confirmed;
            }
            next
        }
        ProcessAction::Failed(message) => {
            if state.phase != ScanPhase::Scanning {
                return state.clone();
            }
            let mut next = state.clone();
            next.phase = ScanPhase::Error;
            next.error = Some(message);
            if next.credit_state == CreditState::Reserved {
                next.credit_state = CreditState::Refunded;
            }
            next
        }
    }
}

/// Applies a per-index batch update; `apply` returns false when the update is a duplicate.
fn update_progress(
    state: &ScanRequest,
    index: usize,
    apply: impl FnOnce(&mut BatchProgress) -> bool,
) -> ScanRequest {
    if state.phase != ScanPhase::Scanning {
        return state.clone();
    }
    let Some(progress) = state.batch_progress.as_ref() else {
        return state.clone();
    };
    if index >= progress.total {
        return state.clone();
    }

    let mut next = state.clone();
    let Some(progress) = next.batch_progress.as_mut() else {
        return state.clone();
    };
    if apply(progress) {
        next
    } else {
        state.clone()
    }
}

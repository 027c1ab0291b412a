use crate::domain::{
    CreditState, INTERRUPTED_MESSAGE, MAX_IMAGES, SAVE_INTERRUPTED_MESSAGE, ScanMode, ScanPhase,
    ScanRequest,
};

use super::super::action::LifecycleAction;

const UNKNOWN_FAILURE_MESSAGE: &str = "The previous scan failed.";

pub fn reduce(state: &ScanRequest, action: LifecycleAction) -> ScanRequest {
    match action {
        LifecycleAction::Start {
            mode,
            request_id,
            user_id,
            started_at,
        } => {
            if !state.is_idle() || mode == ScanMode::Statement {
                return state.clone();
            }
            ScanRequest {
                phase: ScanPhase::Capturing,
                mode,
                request_id: Some(request_id),
                user_id: Some(user_id),
                started_at: Some(started_at),
                ..Default::default()
            }
        }
        LifecycleAction::Cancel => {
            if state.is_idle() {
                return state.clone();
            }
            // The charge decision was made at scan time; cancelling keeps it.
            ScanRequest {
                credit_state: state.credit_state,
                credits_charged: state.credits_charged,
                ..Default::default()
            }
        }
        LifecycleAction::Restore(snapshot) => {
            if !state.is_idle() {
                return state.clone();
            }
            restore(*snapshot)
        }
        LifecycleAction::Reset => ScanRequest::default(),
    }
}

/// Rebuilds a request from a persisted snapshot.
///
/// Work that was suspended on a remote call cannot be resumed, so a snapshot
/// taken mid-scan or mid-save comes back in the error phase.
fn restore(mut snapshot: ScanRequest) -> ScanRequest {
    let interrupted = snapshot.phase == ScanPhase::Scanning;
    if snapshot.is_idle() || (snapshot.mode == ScanMode::Statement && !interrupted) {
        return ScanRequest::default();
    }
    if snapshot.request_id.is_none() {
        snapshot.request_id = Some(recovered_request_id(&snapshot));
    }

    snapshot.images.truncate(MAX_IMAGES);

    match snapshot.phase {
        ScanPhase::Scanning => {
            snapshot.phase = ScanPhase::Error;
            snapshot.error = Some(INTERRUPTED_MESSAGE.to_string());
            match snapshot.credit_state {
                CreditState::Reserved => snapshot.credit_state = CreditState::Refunded,
                CreditState::Confirmed => {
                    // Receipts already analysed are kept; retrying saves them.
                    snapshot.results = snapshot
                        .batch_progress
                        .as_ref()
                        .map(|p| p.succeeded.iter().map(|s| s.receipt.clone()).collect())
                        .unwrap_or_default();
                }
                CreditState::None | CreditState::Refunded => {}
            }
        }
        ScanPhase::Saving => {
            snapshot.phase = ScanPhase::Error;
            snapshot.error = Some(SAVE_INTERRUPTED_MESSAGE.to_string());
        }
        ScanPhase::Error => {
            if snapshot.error.is_none() {
                snapshot.error = Some(UNKNOWN_FAILURE_MESSAGE.to_string());
            }
        }
        ScanPhase::Capturing | ScanPhase::Reviewing | ScanPhase::Idle => {
            snapshot.error = None;
        }
    }

    if snapshot.phase == ScanPhase::Reviewing && snapshot.results.is_empty() {
        snapshot.phase = ScanPhase::Error;
        snapshot.error = Some(UNKNOWN_FAILURE_MESSAGE.to_string());
    }

    let dialog_allowed = matches!(snapshot.phase, ScanPhase::Reviewing | ScanPhase::Error);
    let dialog_in_range = snapshot
        .active_dialog
        .as_ref()
        .and_then(|d| d.result_index())
        .is_none_or(|i| i < snapshot.results.len());
    if !dialog_allowed || !dialog_in_range {
        snapshot.active_dialog = None;
    }

    snapshot
}

/// Stand-in id for snapshots written without one.
fn recovered_request_id(snapshot: &ScanRequest) -> String {
    match snapshot.started_at {
        Some(at) => format!("recovered-{}", at.timestamp_millis()),
        None => "recovered".to_string(),
    }
}

use crate::domain::{MAX_IMAGES, ScanMode, ScanPhase, ScanRequest};

use super::super::action::CaptureAction;

/// Images can change while capturing, or after a failed scan before retrying.
pub fn accepts_images(state: &ScanRequest) -> bool {
    state.phase == ScanPhase::Capturing || state.is_scan_failure()
}

pub fn reduce(state: &ScanRequest, action: CaptureAction) -> ScanRequest {
    if !accepts_images(state) {
        return state.clone();
    }

    let mut next = reopen_capture(state);
    match action {
        CaptureAction::AddImage(image) => match next.mode {
            ScanMode::Single => next.images = vec![image],
            ScanMode::Batch | ScanMode::Statement => {
                if next.images.len() >= MAX_IMAGES {
                    return state.clone();
                }
                next.images.push(image);
            }
        },
        CaptureAction::RemoveImage(index) => {
            if index >= next.images.len() {
                return state.clone();
            }
            // An empty batch stays a batch; falling back to single mode is up to the caller.
            next.images.remove(index);
        }
    }
    next
}

fn reopen_capture(state: &ScanRequest) -> ScanRequest {
    let mut next = state.clone();
    if next.phase == ScanPhase::Error {
        next.phase = ScanPhase::Capturing;
        next.error = None;
        next.active_dialog = None;
        next.batch_progress = None;
    }
    next
}

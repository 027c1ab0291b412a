pub mod capture;
pub mod lifecycle;
pub mod process;
pub mod review;


use crate::domain::ScanRequest;

use super::action::ScanAction;

/// Applies `action` to `state` and returns the next state.
///
/// Total: actions that are illegal in the current phase return an unchanged
/// copy of `state`.
pub fn reduce(state: &ScanRequest, action: ScanAction) -> ScanRequest {
    match action {
        ScanAction::Lifecycle(action) => lifecycle::reduce(state, action),
        ScanAction::Capture(action) => capture::reduce(state, action),
        ScanAction::Process(action) => process::reduce(state, action),
        ScanAction::Review(action) => review::reduce(state, action),
    }
}

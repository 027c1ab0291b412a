use chrono::{DateTime, Utc};

use crate::domain::{
    ActiveDialog, DialogKind, DialogResolution, ImagePayload, ParsedReceipt, RequestId,
    ResultPatch, ScanMode, ScanRequest, UserId,
};

#[derive(Debug, Clone)]
pub enum ScanAction {
    Lifecycle(LifecycleAction),
    Capture(CaptureAction),
    Process(ProcessAction),
    Review(ReviewAction),
}

#[derive(Debug, Clone)]
pub enum LifecycleAction {
    Start {
        mode: ScanMode,
        request_id: RequestId,
        user_id: UserId,
        started_at: DateTime<Utc>,
    },
    /// Confirmed cancel from any non-idle phase.
    Cancel,
    Restore(Box<ScanRequest>),
    Reset,
}

#[derive(Debug, Clone)]
pub enum CaptureAction {
    AddImage(ImagePayload),
    RemoveImage(usize),
}

#[derive(Debug, Clone)]
pub enum ProcessAction {
    /// Credits are reserved and about to be debited.
    Start {
        credits: u32,
    },
    /// The ledger refused the debit; nothing was charged.
    Rejected(String),
    ItemStarted(usize),
    ItemSucceeded {
        index: usize,
        receipt: ParsedReceipt,
    },
    ItemFailed {
        index: usize,
        message: String,
    },
    Succeeded(Vec<ParsedReceipt>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum ReviewAction {
    ShowDialog(ActiveDialog),
    ResolveDialog {
        kind: DialogKind,
        resolution: DialogResolution,
    },
    DismissDialog,
    UpdateResult {
        index: usize,
        patch: ResultPatch,
    },
    SaveStarted,
    SaveSucceeded,
    /// `saved` results were stored before the failure and must not be stored again.
    SaveFailed {
        message: String,
        saved: usize,
    },
}

impl ScanAction {
    /// Short name used in transition logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lifecycle(LifecycleAction::Start { .. }) => "START",
            Self::Lifecycle(LifecycleAction::Cancel) => "CANCEL",
            Self::Lifecycle(LifecycleAction::Restore(_)) => "RESTORE_STATE",
            Self::Lifecycle(LifecycleAction::Reset) => "RESET",
            Self::Capture(CaptureAction::AddImage(_)) => "ADD_IMAGE",
            Self::Capture(CaptureAction::RemoveImage(_)) => "REMOVE_IMAGE",
            Self::Process(ProcessAction::Start { .. }) => "PROCESS_START",
            Self::Process(ProcessAction::Rejected(_)) => "PROCESS_REJECTED",
            Self::Process(ProcessAction::ItemStarted(_)) => "BATCH_ITEM_START",
            Self::Process(ProcessAction::ItemSucceeded { .. }) => "BATCH_ITEM_SUCCESS",
            Self::Process(ProcessAction::ItemFailed { .. }) => "BATCH_ITEM_ERROR",
            Self::Process(ProcessAction::Succeeded(_)) => "PROCESS_SUCCESS",
            Self::Process(ProcessAction::Failed(_)) => "PROCESS_ERROR",
            Self::Review(ReviewAction::ShowDialog(_)) => "SHOW_DIALOG",
            Self::Review(ReviewAction::ResolveDialog { .. }) => "RESOLVE_DIALOG",
            Self::Review(ReviewAction::DismissDialog) => "DISMISS_DIALOG",
            Self::Review(ReviewAction::UpdateResult { .. }) => "UPDATE_RESULT",
            Self::Review(ReviewAction::SaveStarted) => "SAVE_START",
            Self::Review(ReviewAction::SaveSucceeded) => "SAVE_SUCCESS",
            Self::Review(ReviewAction::SaveFailed { .. }) => "SAVE_ERROR",
        }
    }

    /// Actions after which completions of earlier async work must be discarded.
    pub fn supersedes_in_flight_work(&self) -> bool {
        matches!(
            self,
            Self::Lifecycle(
                LifecycleAction::Cancel | LifecycleAction::Reset | LifecycleAction::Restore(_)
            )
        )
    }
}

impl From<LifecycleAction> for ScanAction {
    fn from(action: LifecycleAction) -> Self {
        Self::Lifecycle(action)
    }
}

impl From<CaptureAction> for ScanAction {
    fn from(action: CaptureAction) -> Self {
        Self::Capture(action)
    }
}

impl From<ProcessAction> for ScanAction {
    fn from(action: ProcessAction) -> Self {
        Self::Process(action)
    }
}

impl From<ReviewAction> for ScanAction {
    fn from(action: ReviewAction) -> Self {
        Self::Review(action)
    }
}

//! The scan engine: the single authoritative scan request of one user.
//!
//! Every operation funnels through the pure reducer. The engine adds the
//! side effects around it: debits and refunds on the credit ledger, calls to
//! the analysis service and the expense store, and a snapshot write after
//! every transition. Operations never fail; failures end up in the request.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use super::batch::{BatchCoordinator, BatchOutcome};
use super::checks::next_review_dialog;
use crate::domain::{
    ActiveDialog, CreditState, DialogKind, DialogResolution, ExpenseRecord, ImagePayload,
    ResultPatch, ScanMode, ScanPhase, ScanRequest, UserId,
};
use crate::infra::app_config::ScanConfig;
use crate::infra::services::{CreditLedger, ExpenseStore, ReceiptAnalyzer};
use crate::infra::snapshot::ScanPersistence;
use crate::store::reducer::{capture, process, review};
use crate::store::{
    CaptureAction, LifecycleAction, ProcessAction, ReviewAction, ScanAction, reduce,
};

/// Collaborators injected into a [`ScanEngine`].
#[derive(Clone)]
pub struct ScanServices {
    pub analyzer: Arc<dyn ReceiptAnalyzer>,
    pub store: Arc<dyn ExpenseStore>,
    pub ledger: Arc<dyn CreditLedger>,
    pub persistence: ScanPersistence,
    pub config: ScanConfig,
}

/// Result of [`ScanEngine::start`].
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// A new request was created.
    Started(ScanRequest),
    /// A request was already active; it is returned untouched.
    Resumed(ScanRequest),
    /// The mode cannot be scanned.
    Unsupported(ScanMode),
}

impl StartOutcome {
    pub fn request(&self) -> Option<&ScanRequest> {
        match self {
            Self::Started(request) | Self::Resumed(request) => Some(request),
            Self::Unsupported(_) => None,
        }
    }
}

struct EngineCore {
    state: ScanRequest,
    /// Bumped whenever in-flight async work must stop being applied.
    epoch: u64,
    debit_pending: bool,
}

struct EngineInner {
    user_id: UserId,
    services: ScanServices,
    core: Mutex<EngineCore>,
    updates: watch::Sender<ScanRequest>,
}

/// Cheaply cloneable handle to a user's scan request.
#[derive(Clone)]
pub struct ScanEngine {
    inner: Arc<EngineInner>,
}

impl ScanEngine {
    pub fn new(user_id: impl Into<UserId>, services: ScanServices) -> Self {
        let (updates, _) = watch::channel(ScanRequest::default());
        Self {
            inner: Arc::new(EngineInner {
                user_id: user_id.into(),
                services,
                core: Mutex::new(EngineCore {
                    state: ScanRequest::default(),
                    epoch: 0,
                    debit_pending: false,
                }),
                updates,
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn config(&self) -> &ScanConfig {
        &self.inner.services.config
    }

    pub fn state(&self) -> ScanRequest {
        self.inner.core.lock().state.clone()
    }

    /// Receives every new state after it has been persisted.
    pub fn subscribe(&self) -> watch::Receiver<ScanRequest> {
        self.inner.updates.subscribe()
    }

    pub fn is_blocking(&self) -> bool {
        self.inner.core.lock().state.is_blocking()
    }

    pub fn can_navigate_freely(&self) -> bool {
        !self.is_blocking()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.core.lock().state.is_processing()
    }

    pub fn has_active_request(&self) -> bool {
        !self.inner.core.lock().state.is_idle()
    }

    /// Starts a request, or hands back the one already in progress.
    pub fn start(&self, mode: ScanMode) -> StartOutcome {
        let mut core = self.inner.core.lock();
        if !core.state.is_idle() {
            log::debug!(
                "Resuming {} request instead of starting {mode}",
                core.state.phase
            );
            return StartOutcome::Resumed(core.state.clone());
        }
        if mode == ScanMode::Statement {
            return StartOutcome::Unsupported(mode);
        }
        let action = LifecycleAction::Start {
            mode,
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: self.inner.user_id.clone(),
            started_at: Utc::now(),
        };
        StartOutcome::Started(self.apply(&mut core, action.into()))
    }

    pub fn add_image(&self, image: ImagePayload) -> ScanRequest {
        self.capture(CaptureAction::AddImage(image))
    }

    pub fn remove_image(&self, index: usize) -> ScanRequest {
        self.capture(CaptureAction::RemoveImage(index))
    }

    fn capture(&self, action: CaptureAction) -> ScanRequest {
        let mut core = self.inner.core.lock();
        // The amount being debited was computed from the current images.
        if core.debit_pending || !capture::accepts_images(&core.state) {
            return core.state.clone();
        }
        self.apply(&mut core, action.into())
    }

    /// Debits credits and analyses the captured images.
    ///
    /// Absorbed unless the request is ready to scan and no debit is pending.
    pub async fn process(&self) -> ScanRequest {
        let (epoch, credits, mode, images) = {
            let mut core = self.inner.core.lock();
            if core.debit_pending || !process::can_begin(&core.state) {
                return core.state.clone();
            }
            let credits = process::credits_for(&core.state);
            // Persisted before the ledger call: a crash mid-debit restores as an
            // interrupted scan with the reservation refunded.
            let started = self.apply(&mut core, ProcessAction::Start { credits }.into());
            core.debit_pending = true;
            (core.epoch, credits, started.mode, started.images)
        };

        let services = &self.inner.services;
        let user_id = self.user_id();
        let debit = services.ledger.debit(user_id, credits).await;
        self.inner.core.lock().debit_pending = false;

        match debit {
            Ok(()) => log::info!("Debited {credits} scan credit(s) from {user_id}"),
            Err(err) => {
                log::warn!("Debit of {credits} credit(s) for {user_id} refused: {err}");
                self.dispatch_if_current(epoch, ProcessAction::Rejected(err.to_string()));
                return self.state();
            }
        }

        if !self.is_current(epoch) {
            // Cancelled while the debit was in flight; the charge stands.
            log::info!("Scan for {user_id} superseded before analysis began");
            return self.state();
        }

        match mode {
            ScanMode::Batch => self.process_batch(epoch, credits, &images).await,
            ScanMode::Single | ScanMode::Statement => {
                self.process_single(epoch, credits, &images).await
            }
        }
        self.state()
    }

    async fn process_single(&self, epoch: u64, credits: u32, images: &[ImagePayload]) {
        let Some(image) = images.first() else {
            return;
        };
        match self.inner.services.analyzer.analyze(image).await {
            Ok(receipt) => {
                let dialog = next_review_dialog(&receipt, 0, self.config(), None);
                if self.dispatch_if_current(epoch, ProcessAction::Succeeded(vec![receipt]))
                    && let Some(dialog) = dialog
                {
                    self.dispatch_if_current(epoch, ReviewAction::ShowDialog(dialog));
                }
            }
            Err(err) => {
                log::warn!("Receipt analysis failed: {err}");
                // Nothing succeeded, so delivering the error moves the credit
                // from reserved to refunded.
                if self.dispatch_if_current(epoch, ProcessAction::Failed(err.to_string())) {
                    self.refund(credits).await;
                }
            }
        }
    }

    async fn process_batch(&self, epoch: u64, credits: u32, images: &[ImagePayload]) {
        let services = &self.inner.services;
        let coordinator = BatchCoordinator::new(
            services.analyzer.clone(),
            services.config.effective_concurrency(),
        );
        let report = coordinator
            .run(images, |action| self.dispatch_if_current(epoch, action))
            .await;

        match report.outcome {
            BatchOutcome::Completed => {
                let summary = ActiveDialog::CompletionSummary {
                    succeeded: report.succeeded,
                    failed: report.failed,
                };
                self.dispatch_if_current(epoch, ReviewAction::ShowDialog(summary));
            }
            BatchOutcome::AllFailed => self.refund(credits).await,
            BatchOutcome::Superseded => {}
        }
    }

    /// Resolves the active dialog and runs whatever the answer implies.
    pub async fn resolve_dialog(&self, resolution: DialogResolution) -> ScanRequest {
        let (epoch, resolved, next) = {
            let mut core = self.inner.core.lock();
            let Some(active) = core.state.active_dialog.clone() else {
                return core.state.clone();
            };
            let action = ReviewAction::ResolveDialog {
                kind: active.kind(),
                resolution: resolution.clone(),
            };
            let next = self.apply(&mut core, action.into());
            if next.active_dialog.is_some() {
                // wrong kind of answer
                return next;
            }
            (core.epoch, active, next)
        };

        match (resolved.kind(), resolution) {
            (DialogKind::QuickConfirm, DialogResolution::Confirm) => self.save().await,
            (kind @ (DialogKind::CurrencyMismatch | DialogKind::TotalMismatch), _) => {
                let follow_up = resolved.result_index().and_then(|index| {
                    let receipt = next.results.get(index)?;
                    next_review_dialog(receipt, index, self.config(), Some(kind))
                });
                if let Some(dialog) = follow_up {
                    self.dispatch_if_current(epoch, ReviewAction::ShowDialog(dialog));
                }
                self.state()
            }
            _ => next,
        }
    }

    pub fn dismiss_dialog(&self) -> ScanRequest {
        self.dispatch(ReviewAction::DismissDialog)
    }

    pub fn update_result(&self, index: usize, patch: ResultPatch) -> ScanRequest {
        if patch.is_empty() {
            return self.state();
        }
        self.dispatch(ReviewAction::UpdateResult { index, patch })
    }

    /// Stores every reviewed result, in order.
    ///
    /// On failure the results already stored are dropped from the request so a
    /// retry stores only the rest.
    pub async fn save(&self) -> ScanRequest {
        let (epoch, request) = {
            let mut core = self.inner.core.lock();
            if !review::can_begin_save(&core.state) {
                return core.state.clone();
            }
            let request = self.apply(&mut core, ReviewAction::SaveStarted.into());
            (core.epoch, request)
        };
        let request_id = request.request_id.clone().unwrap_or_default();

        for (index, receipt) in request.results.into_iter().enumerate() {
            if !self.is_current(epoch) {
                log::info!("Save of {request_id} superseded after {index} record(s)");
                return self.state();
            }
            let record = ExpenseRecord {
                request_id: request_id.clone(),
                user_id: self.inner.user_id.clone(),
                source_index: index,
                receipt,
                created_at: Utc::now(),
            };
            match self.inner.services.store.save(&record).await {
                Ok(id) => log::debug!("Stored expense {id} for {request_id}"),
                Err(err) => {
                    log::warn!("Saving {request_id} failed after {index} record(s): {err}");
                    self.dispatch_if_current(
                        epoch,
                        ReviewAction::SaveFailed {
                            message: err.to_string(),
                            saved: index,
                        },
                    );
                    return self.state();
                }
            }
        }

        self.dispatch_if_current(epoch, ReviewAction::SaveSucceeded);
        self.state()
    }

    /// Abandons the request. Credits already spent stay spent.
    pub fn cancel(&self) -> ScanRequest {
        self.dispatch(LifecycleAction::Cancel)
    }

    pub fn reset(&self) -> ScanRequest {
        self.dispatch(LifecycleAction::Reset)
    }

    /// Rebuilds the request from the user's snapshot, if any.
    ///
    /// A snapshot taken mid-scan comes back as an error; if its credits were
    /// still reserved they are refunded here.
    pub async fn restore(&self) -> ScanRequest {
        let Some(mut snapshot) = self.inner.services.persistence.load(&self.inner.user_id) else {
            return self.state();
        };
        if !snapshot.state.is_idle() && snapshot.state.request_id.is_none() {
            snapshot.state.request_id = Some(uuid::Uuid::new_v4().to_string());
        }
        let interrupted_charge = (snapshot.state.phase == ScanPhase::Scanning
            && snapshot.state.credit_state == CreditState::Reserved)
            .then_some(snapshot.state.credits_charged);

        let (applied, next) = {
            let mut core = self.inner.core.lock();
            if !core.state.is_idle() {
                return core.state.clone();
            }
            let next = self.apply(
                &mut core,
                LifecycleAction::Restore(Box::new(snapshot.state)).into(),
            );
            (!next.is_idle(), next)
        };
        log::info!(
            "Restored scan request for {} as {} (saved {})",
            self.inner.user_id,
            next.phase,
            snapshot.persisted_at
        );

        if applied
            && next.credit_state == CreditState::Refunded
            && let Some(amount) = interrupted_charge
        {
            self.refund(amount).await;
        }
        self.state()
    }

    fn dispatch(&self, action: impl Into<ScanAction>) -> ScanRequest {
        let mut core = self.inner.core.lock();
        self.apply(&mut core, action.into())
    }

    /// Applies `action` only if no cancel, reset or restore happened since
    /// `epoch` was captured. Returns whether the action was delivered.
    pub(crate) fn dispatch_if_current(&self, epoch: u64, action: impl Into<ScanAction>) -> bool {
        let mut core = self.inner.core.lock();
        if core.epoch != epoch {
            return false;
        }
        self.apply(&mut core, action.into());
        true
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.core.lock().epoch == epoch
    }

    /// Runs the reducer and publishes the result; the lock is held throughout
    /// so snapshots are written in transition order.
    fn apply(&self, core: &mut EngineCore, action: ScanAction) -> ScanRequest {
        let name = action.name();
        if action.supersedes_in_flight_work() {
            core.epoch += 1;
        }
        let next = reduce(&core.state, action);
        if next == core.state {
            log::debug!("{name} absorbed in {}", core.state.phase);
            return next;
        }

        log::debug!("{name}: {} -> {}", core.state.phase, next.phase);
        if let Err(err) = self
            .inner
            .services
            .persistence
            .persist(&self.inner.user_id, &next)
        {
            log::warn!(
                "Failed to persist scan request for {}: {err:#}",
                self.inner.user_id
            );
        }
        core.state = next.clone();
        self.inner.updates.send_replace(next.clone());
        next
    }

    async fn refund(&self, amount: u32) {
        if amount == 0 {
            return;
        }
        let user_id = self.user_id();
        match self.inner.services.ledger.credit(user_id, amount).await {
            Ok(()) => log::info!("Refunded {amount} scan credit(s) to {user_id}"),
            Err(err) => log::warn!("Refund of {amount} credit(s) to {user_id} failed: {err}"),
        }
    }
}

impl std::fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("ScanEngine")
            .field("user_id", &self.inner.user_id)
            .field("phase", &core.state.phase)
            .field("epoch", &core.epoch)
            .finish()
    }
}

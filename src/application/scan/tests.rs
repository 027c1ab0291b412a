use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Notify;

use super::{ScanEngine, ScanServices, StartOutcome};
use crate::domain::{
    ActiveDialog, AnalysisError, CreditState, DialogKind, DialogResolution, INTERRUPTED_MESSAGE,
    ImagePayload, LedgerError, ParsedReceipt, ReceiptItem, ScanMode, ScanPhase, ScanRequest,
};
use crate::infra::app_config::ScanConfig;
use crate::infra::services::{
    CreditLedger, InMemoryExpenseStore, InMemoryLedger, ReceiptAnalyzer,
};
use crate::infra::snapshot::{MemorySnapshotSlot, ScanPersistence, decode};

const USER: &str = "user-1";

fn receipt(merchant: &str, currency: &str, total: Decimal) -> ParsedReceipt {
    ParsedReceipt {
        merchant: merchant.into(),
        date: None,
        currency: Some(currency.into()),
        items: vec![ReceiptItem {
            name: "Lunch".into(),
            quantity: dec!(2),
            unit_price: dec!(3.50),
            category: Some("food".into()),
        }],
        total,
        tax: None,
        confidence: Some(0.95),
    }
}

/// Answers per image according to the image's first byte.
#[derive(Default)]
struct ScriptedAnalyzer {
    outcomes: Mutex<HashMap<u8, Result<ParsedReceipt, AnalysisError>>>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    fn on(self, tag: u8, outcome: Result<ParsedReceipt, AnalysisError>) -> Self {
        self.outcomes.lock().insert(tag, outcome);
        self
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl ReceiptAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, image: &ImagePayload) -> Result<ParsedReceipt, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let tag = image.data[0];
        self.outcomes
            .lock()
            .get(&tag)
            .cloned()
            .unwrap_or_else(|| Ok(receipt(&format!("Shop {tag}"), "USD", dec!(7.00))))
    }
}

struct Harness {
    engine: ScanEngine,
    analyzer: Arc<ScriptedAnalyzer>,
    ledger: Arc<InMemoryLedger>,
    store: Arc<InMemoryExpenseStore>,
    slot: Arc<MemorySnapshotSlot>,
}

impl Harness {
    fn new(analyzer: ScriptedAnalyzer) -> Self {
        Self::with(analyzer, ScanConfig::default(), Arc::new(MemorySnapshotSlot::new()))
    }

    fn with(
        analyzer: ScriptedAnalyzer,
        config: ScanConfig,
        slot: Arc<MemorySnapshotSlot>,
    ) -> Self {
        let analyzer = Arc::new(analyzer);
        let ledger = Arc::new(InMemoryLedger::with_balance(USER, 10));
        let store = Arc::new(InMemoryExpenseStore::new());
        let engine = ScanEngine::new(
            USER,
            ScanServices {
                analyzer: analyzer.clone(),
                store: store.clone(),
                ledger: ledger.clone(),
                persistence: ScanPersistence::new(slot.clone()),
                config,
            },
        );
        Self {
            engine,
            analyzer,
            ledger,
            store,
            slot,
        }
    }

    fn capture(&self, mode: ScanMode, tags: &[u8]) {
        assert!(matches!(self.engine.start(mode), StartOutcome::Started(_)));
        for tag in tags {
            self.engine.add_image(ImagePayload::jpeg(vec![*tag]));
        }
    }

    fn persisted(&self) -> Option<ScanRequest> {
        self.slot
            .payload(USER)
            .map(|payload| decode(&payload).expect("valid snapshot").state)
    }
}

#[tokio::test]
async fn happy_path_single_scan() {
    let h = Harness::new(ScriptedAnalyzer::default());
    h.capture(ScanMode::Single, &[1]);

    let state = h.engine.process().await;
    assert_eq!(state.phase, ScanPhase::Reviewing);
    assert_eq!(state.results.len(), 1);
    assert_eq!(state.credit_state, CreditState::Confirmed);
    assert!(state.active_dialog.is_none());
    assert_eq!(h.ledger.balance(USER), Some(9));
    assert_eq!(h.persisted().map(|s| s.phase), Some(ScanPhase::Reviewing));

    let state = h.engine.save().await;
    assert!(state.is_idle());
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.store.records()[0].user_id, USER);
    assert!(h.persisted().is_none());
}

#[tokio::test]
async fn start_while_active_resumes_the_existing_request() {
    let h = Harness::new(ScriptedAnalyzer::default());
    let StartOutcome::Started(first) = h.engine.start(ScanMode::Batch) else {
        panic!("first start should create a request");
    };
    h.engine.add_image(ImagePayload::jpeg(vec![1]));

    let StartOutcome::Resumed(resumed) = h.engine.start(ScanMode::Single) else {
        panic!("second start should resume");
    };
    assert_eq!(resumed.request_id, first.request_id);
    assert_eq!(resumed.mode, ScanMode::Batch);
    assert_eq!(resumed.images.len(), 1);
}

#[tokio::test]
async fn statement_mode_is_not_started() {
    let h = Harness::new(ScriptedAnalyzer::default());
    assert_eq!(
        h.engine.start(ScanMode::Statement),
        StartOutcome::Unsupported(ScanMode::Statement)
    );
    assert!(!h.engine.has_active_request());
}

#[tokio::test]
async fn single_failure_refunds_the_credit() {
    let h = Harness::new(
        ScriptedAnalyzer::default().on(1, Err(AnalysisError::Unreadable("too dark".into()))),
    );
    h.capture(ScanMode::Single, &[1]);

    let state = h.engine.process().await;
    assert_eq!(state.phase, ScanPhase::Error);
    assert_eq!(state.credit_state, CreditState::Refunded);
    assert!(state.error.as_deref().unwrap_or_default().contains("too dark"));
    assert_eq!(h.ledger.debited(USER), 1);
    assert_eq!(h.ledger.credited(USER), 1);
    assert_eq!(h.ledger.balance(USER), Some(10));
}

#[tokio::test]
async fn retry_after_failure_debits_again() {
    let h = Harness::new(ScriptedAnalyzer::default().on(1, Err(AnalysisError::Timeout)));
    h.capture(ScanMode::Single, &[1]);
    h.engine.process().await;

    h.engine.add_image(ImagePayload::jpeg(vec![2]));
    let state = h.engine.process().await;
    assert_eq!(state.phase, ScanPhase::Reviewing);
    assert_eq!(h.ledger.debited(USER), 2);
    assert_eq!(h.ledger.credited(USER), 1);
}

#[tokio::test]
async fn batch_partial_failure_keeps_the_successes() {
    let h = Harness::new(
        ScriptedAnalyzer::default().on(2, Err(AnalysisError::Rejected("not a receipt".into()))),
    );
    h.capture(ScanMode::Batch, &[1, 2, 3]);

    let state = h.engine.process().await;
    assert_eq!(state.phase, ScanPhase::Reviewing);
    let merchants: Vec<_> = state.results.iter().map(|r| r.merchant.as_str()).collect();
    assert_eq!(merchants, ["Shop 1", "Shop 3"]);
    assert_eq!(
        state.active_dialog,
        Some(ActiveDialog::CompletionSummary {
            succeeded: 2,
            failed: 1
        })
    );
    assert_eq!(state.credit_state, CreditState::Confirmed);
    assert_eq!(h.ledger.debited(USER), 3);
    assert_eq!(h.ledger.credited(USER), 0);

    let state = h
        .engine
        .resolve_dialog(DialogResolution::Acknowledge)
        .await;
    assert!(state.active_dialog.is_none());

    let state = h.engine.save().await;
    assert!(state.is_idle());
    let indices: Vec<_> = h.store.records().iter().map(|r| r.source_index).collect();
    assert_eq!(indices, [0, 1]);
}

#[tokio::test]
async fn full_batch_failure_refunds_every_credit() {
    let failing = ScriptedAnalyzer::default()
        .on(1, Err(AnalysisError::Timeout))
        .on(2, Err(AnalysisError::Timeout))
        .on(3, Err(AnalysisError::Service("503".into())));
    let h = Harness::new(failing);
    h.capture(ScanMode::Batch, &[1, 2, 3]);

    let state = h.engine.process().await;
    assert_eq!(state.phase, ScanPhase::Error);
    assert_eq!(state.credit_state, CreditState::Refunded);
    assert_eq!(state.batch_progress.map(|p| p.failed.len()), Some(3));
    assert_eq!(h.ledger.debited(USER), 3);
    assert_eq!(h.ledger.credited(USER), 3);
}

#[tokio::test]
async fn refused_debit_starts_no_analysis() {
    let h = Harness::new(ScriptedAnalyzer::default());
    h.ledger.set_balance(USER, 1);
    h.capture(ScanMode::Batch, &[1, 2]);

    let state = h.engine.process().await;
    assert_eq!(state.phase, ScanPhase::Error);
    assert_eq!(state.credit_state, CreditState::Refunded);
    assert_eq!(state.credits_charged, 0);
    assert!(state.error.as_deref().unwrap_or_default().contains("Not enough"));
    assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
    assert!(h.ledger.journal().is_empty());

    // nothing left to refund if the app restarts now
    let persisted = h.persisted().expect("rejection is persisted");
    assert_eq!(persisted.phase, ScanPhase::Error);
    assert_eq!(persisted.credits_charged, 0);
}

/// Holds every debit until released.
struct GatedLedger {
    inner: Arc<InMemoryLedger>,
    gate: Arc<Notify>,
}

#[async_trait]
impl CreditLedger for GatedLedger {
    async fn debit(&self, user_id: &str, amount: u32) -> Result<(), LedgerError> {
        self.gate.notified().await;
        self.inner.debit(user_id, amount).await
    }

    async fn credit(&self, user_id: &str, amount: u32) -> Result<(), LedgerError> {
        self.inner.credit(user_id, amount).await
    }
}

#[tokio::test]
async fn credit_is_reserved_and_persisted_before_the_debit() {
    let gate = Arc::new(Notify::new());
    let slot = Arc::new(MemorySnapshotSlot::new());
    let ledger = Arc::new(InMemoryLedger::with_balance(USER, 10));
    let engine = ScanEngine::new(
        USER,
        ScanServices {
            analyzer: Arc::new(ScriptedAnalyzer::default()),
            store: Arc::new(InMemoryExpenseStore::new()),
            ledger: Arc::new(GatedLedger {
                inner: ledger.clone(),
                gate: gate.clone(),
            }),
            persistence: ScanPersistence::new(slot.clone()),
            config: ScanConfig::default(),
        },
    );
    engine.start(ScanMode::Batch);
    engine.add_image(ImagePayload::jpeg(vec![1]));
    engine.add_image(ImagePayload::jpeg(vec![2]));

    let observer = engine.clone();
    let (state, _) = tokio::join!(engine.process(), async move {
        let pending = observer.state();
        assert_eq!(pending.phase, ScanPhase::Scanning);
        assert_eq!(pending.credit_state, CreditState::Reserved);
        assert_eq!(pending.credits_charged, 2);
        let persisted = decode(&slot.payload(USER).expect("snapshot written"))
            .expect("valid snapshot")
            .state;
        assert_eq!(persisted.phase, ScanPhase::Scanning);
        assert_eq!(persisted.credits_charged, 2);

        // capture is frozen while the debit is pending
        let after = observer.add_image(ImagePayload::jpeg(vec![3]));
        assert_eq!(after.images.len(), 2);
        gate.notify_one();
    });
    assert_eq!(state.phase, ScanPhase::Reviewing);
    assert_eq!(ledger.debited(USER), 2);
}

#[tokio::test]
async fn cancel_mid_scan_discards_the_result_without_refund() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(ScriptedAnalyzer::default().gated(gate.clone()));
    h.capture(ScanMode::Single, &[1]);

    let engine = h.engine.clone();
    let (state, _) = tokio::join!(h.engine.process(), async move {
        while !engine.is_processing() {
            tokio::task::yield_now().await;
        }
        engine.cancel();
        gate.notify_one();
    });

    assert!(state.is_idle());
    assert!(state.results.is_empty());
    assert_eq!(h.ledger.debited(USER), 1);
    assert_eq!(h.ledger.credited(USER), 0);
    assert!(h.persisted().is_none());
}

#[tokio::test]
async fn concurrent_process_debits_once() {
    let h = Harness::new(ScriptedAnalyzer::default());
    h.capture(ScanMode::Single, &[1]);

    let (a, b) = tokio::join!(h.engine.process(), h.engine.process());
    assert!(a.phase == ScanPhase::Reviewing || b.phase == ScanPhase::Reviewing);
    assert_eq!(h.ledger.debited(USER), 1);
    assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn review_checks_run_in_order() {
    let h = Harness::new(
        ScriptedAnalyzer::default().on(1, Ok(receipt("Cafe", "eur", dec!(9.00)))),
    );
    h.capture(ScanMode::Single, &[1]);

    let state = h.engine.process().await;
    assert_eq!(
        state.active_dialog.as_ref().map(|d| d.kind()),
        Some(DialogKind::CurrencyMismatch)
    );
    assert!(h.engine.is_blocking());
    assert!(!h.engine.can_navigate_freely());

    // an answer for another dialog is ignored
    let state = h.engine.resolve_dialog(DialogResolution::UseItemsTotal).await;
    assert_eq!(
        state.active_dialog.as_ref().map(|d| d.kind()),
        Some(DialogKind::CurrencyMismatch)
    );

    let state = h
        .engine
        .resolve_dialog(DialogResolution::UseCurrency("usd".into()))
        .await;
    assert_eq!(state.results[0].currency.as_deref(), Some("USD"));
    assert_eq!(
        state.active_dialog,
        Some(ActiveDialog::TotalMismatch {
            result_index: 0,
            receipt_total: dec!(9.00),
            items_total: dec!(7.00),
        })
    );

    let state = h.engine.resolve_dialog(DialogResolution::UseItemsTotal).await;
    assert!(state.active_dialog.is_none());
    assert_eq!(state.results[0].total, dec!(7.00));
    assert_eq!(state.phase, ScanPhase::Reviewing);
}

#[tokio::test]
async fn quick_confirm_saves_immediately() {
    let config = ScanConfig {
        quick_confirm: true,
        ..Default::default()
    };
    let h = Harness::with(
        ScriptedAnalyzer::default(),
        config,
        Arc::new(MemorySnapshotSlot::new()),
    );
    h.capture(ScanMode::Single, &[1]);

    let state = h.engine.process().await;
    assert_eq!(
        state.active_dialog,
        Some(ActiveDialog::QuickConfirm { result_index: 0 })
    );

    let state = h.engine.resolve_dialog(DialogResolution::Confirm).await;
    assert!(state.is_idle());
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn failed_save_retries_only_unsaved_results() {
    let h = Harness::new(ScriptedAnalyzer::default());
    h.capture(ScanMode::Batch, &[1, 2, 3]);
    h.engine.process().await;
    h.engine.dismiss_dialog();

    h.store.fail_after(Some(1));
    let state = h.engine.save().await;
    assert_eq!(state.phase, ScanPhase::Error);
    assert!(state.is_save_failure());
    assert_eq!(state.results.len(), 2);
    assert_eq!(h.store.len(), 1);

    h.store.fail_after(None);
    let state = h.engine.save().await;
    assert!(state.is_idle());
    let merchants: Vec<_> = h
        .store
        .records()
        .into_iter()
        .map(|r| r.receipt.merchant)
        .collect();
    assert_eq!(merchants, ["Shop 1", "Shop 2", "Shop 3"]);
}

#[tokio::test]
async fn update_result_edits_during_review() {
    let h = Harness::new(ScriptedAnalyzer::default());
    h.capture(ScanMode::Single, &[1]);
    h.engine.process().await;

    let state = h.engine.update_result(
        0,
        crate::domain::ResultPatch {
            merchant: Some("Renamed".into()),
            ..Default::default()
        },
    );
    assert_eq!(state.results[0].merchant, "Renamed");
}

#[tokio::test]
async fn restore_refunds_an_interrupted_scan_once() {
    let slot = Arc::new(MemorySnapshotSlot::new());
    let interrupted = ScanRequest {
        phase: ScanPhase::Scanning,
        mode: ScanMode::Batch,
        images: vec![ImagePayload::jpeg(vec![1]), ImagePayload::jpeg(vec![2])],
        credit_state: CreditState::Reserved,
        credits_charged: 2,
        batch_progress: Some(crate::domain::BatchProgress::new(2)),
        request_id: Some("req-crashed".into()),
        user_id: Some(USER.into()),
        started_at: Some(Utc::now()),
        ..Default::default()
    };
    ScanPersistence::new(slot.clone())
        .persist(USER, &interrupted)
        .unwrap();

    let h = Harness::with(ScriptedAnalyzer::default(), ScanConfig::default(), slot.clone());
    let state = h.engine.restore().await;
    assert_eq!(state.phase, ScanPhase::Error);
    assert_eq!(state.error.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(state.credit_state, CreditState::Refunded);
    assert_eq!(state.request_id.as_deref(), Some("req-crashed"));
    assert_eq!(h.ledger.credited(USER), 2);

    // a second restart finds the already refunded error state
    let again = Harness::with(ScriptedAnalyzer::default(), ScanConfig::default(), slot);
    let state = again.engine.restore().await;
    assert_eq!(state.phase, ScanPhase::Error);
    assert_eq!(again.ledger.credited(USER), 0);
}

#[tokio::test]
async fn restore_without_request_id_still_refunds() {
    let slot = Arc::new(MemorySnapshotSlot::new());
    let interrupted = ScanRequest {
        phase: ScanPhase::Scanning,
        mode: ScanMode::Single,
        images: vec![ImagePayload::jpeg(vec![1])],
        credit_state: CreditState::Reserved,
        credits_charged: 1,
        user_id: Some(USER.into()),
        ..Default::default()
    };
    ScanPersistence::new(slot.clone())
        .persist(USER, &interrupted)
        .unwrap();

    let h = Harness::with(ScriptedAnalyzer::default(), ScanConfig::default(), slot);
    let state = h.engine.restore().await;
    assert_eq!(state.phase, ScanPhase::Error);
    assert_eq!(state.error.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert!(state.request_id.is_some());
    assert!(state.is_consistent());
    assert_eq!(h.ledger.credited(USER), 1);
}

#[tokio::test]
async fn restore_is_ignored_when_a_request_is_active() {
    let h = Harness::new(ScriptedAnalyzer::default());
    h.capture(ScanMode::Single, &[1]);
    let before = h.engine.state();
    assert_eq!(h.engine.restore().await, before);
}

#[tokio::test]
async fn persistence_failures_never_surface() {
    let h = Harness::new(ScriptedAnalyzer::default());
    h.slot.set_fail_writes(true);
    h.capture(ScanMode::Single, &[1]);

    let state = h.engine.process().await;
    assert_eq!(state.phase, ScanPhase::Reviewing);
    assert_eq!(h.slot.writes(), 0);
}

#[tokio::test]
async fn every_transition_is_persisted_and_published() {
    let h = Harness::new(ScriptedAnalyzer::default());
    let mut updates = h.engine.subscribe();
    h.capture(ScanMode::Batch, &[1, 2]);

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().images.len(), 2);

    let persisted = h.persisted().expect("capture is persisted");
    assert_eq!(persisted.phase, ScanPhase::Capturing);
    assert_eq!(persisted.images.len(), 2);
    // start plus two images
    assert_eq!(h.slot.writes(), 3);

    h.engine.cancel();
    assert!(h.persisted().is_none());
    assert!(updates.borrow_and_update().is_idle());
}

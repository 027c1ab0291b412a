//! Upgrades of older snapshot layouts.
//!
//! Version 1 called the analysis phase `processing`, tracked credits as two
//! booleans and listed batch successes without their image index.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::domain::{
    ActiveDialog, BatchFailure, BatchProgress, BatchSuccess, CreditState, ImagePayload,
    ParsedReceipt, RequestId, ScanMode, ScanPhase, ScanRequest, SnapshotError, UserId,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V1Request {
    phase: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    images: Vec<ImagePayload>,
    #[serde(default)]
    results: Vec<ParsedReceipt>,
    #[serde(default)]
    active_dialog: Option<ActiveDialog>,
    #[serde(default)]
    credit_debited: bool,
    #[serde(default)]
    credit_refunded: bool,
    #[serde(default)]
    batch_progress: Option<V1BatchProgress>,
    #[serde(default)]
    request_id: Option<RequestId>,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V1BatchProgress {
    total: usize,
    #[serde(default)]
    succeeded: Vec<ParsedReceipt>,
    #[serde(default)]
    failed: Vec<BatchFailure>,
}

fn malformed(message: String) -> SnapshotError {
    SnapshotError::Malformed(<serde_json::Error as serde::de::Error>::custom(message))
}

pub(super) fn from_v1(value: serde_json::Value) -> Result<ScanRequest, SnapshotError> {
    let old: V1Request = serde_json::from_value(value)?;

    let phase = ScanPhase::from_str(&old.phase).map_err(malformed)?;
    let mode = old
        .mode
        .as_deref()
        .map(ScanMode::from_str)
        .transpose()
        .map_err(malformed)?
        .unwrap_or_default();
    let batch_progress = old.batch_progress.map(index_successes);

    let any_success = !old.results.is_empty()
        || batch_progress
            .as_ref()
            .is_some_and(|p| !p.succeeded.is_empty());
    let credit_state = match (old.credit_debited, old.credit_refunded) {
        (_, true) => CreditState::Refunded,
        (true, false) if any_success => CreditState::Confirmed,
        (true, false) => CreditState::Reserved,
        (false, false) => CreditState::None,
    };
    let credits_charged = match credit_state {
        CreditState::None => 0,
        _ if mode == ScanMode::Batch => old.images.len() as u32,
        _ => 1,
    };

    Ok(ScanRequest {
        phase,
        mode,
        images: old.images,
        results: old.results,
        active_dialog: old.active_dialog,
        credit_state,
        credits_charged,
        batch_progress,
        request_id: old.request_id,
        user_id: old.user_id,
        started_at: old.started_at,
        error: old.error,
    })
}

/// Assigns successes to the lowest indices that did not fail, which is the
/// order version 1 appended them in when completions arrived in order.
fn index_successes(old: V1BatchProgress) -> BatchProgress {
    let failed: BTreeSet<usize> = old.failed.iter().map(|f| f.index).collect();
    let free = (0..old.total).filter(|i| !failed.contains(i));
    let mut succeeded: Vec<BatchSuccess> = free
        .zip(old.succeeded)
        .map(|(index, receipt)| BatchSuccess { index, receipt })
        .collect();
    succeeded.sort_by_key(|s| s.index);

    let mut failed_list = old.failed;
    failed_list.sort_by_key(|f| f.index);
    failed_list.dedup_by_key(|f| f.index);

    let started = succeeded
        .iter()
        .map(|s| s.index)
        .chain(failed_list.iter().map(|f| f.index))
        .collect();

    BatchProgress {
        total: old.total,
        started,
        succeeded,
        failed: failed_list,
    }
}

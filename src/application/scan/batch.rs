//! Concurrent analysis of the images of a batch request.

use futures::StreamExt;
use futures::stream;
use std::sync::Arc;

use crate::domain::{ImagePayload, ParsedReceipt};
use crate::infra::app_config::MAX_CONCURRENT_ANALYSES;
use crate::infra::services::ReceiptAnalyzer;
use crate::store::ProcessAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// At least one image succeeded; `PROCESS_SUCCESS` was delivered.
    Completed,
    /// Every image failed; `PROCESS_ERROR` was delivered.
    AllFailed,
    /// The request moved on while the batch ran; later results were dropped.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs the analyses of a batch with a bounded number in flight.
///
/// Analyses are started in index order and may finish in any order. All
/// outstanding futures are polled on the caller's task.
pub struct BatchCoordinator {
    analyzer: Arc<dyn ReceiptAnalyzer>,
    concurrency: usize,
}

impl BatchCoordinator {
    pub fn new(analyzer: Arc<dyn ReceiptAnalyzer>, concurrency: usize) -> Self {
        Self {
            analyzer,
            concurrency: concurrency.clamp(1, MAX_CONCURRENT_ANALYSES),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Analyses `images`, reporting progress through `dispatch`.
    ///
    /// `dispatch` returns false once the batch has been superseded. From then
    /// on no analysis is started and in-flight ones are dropped.
    pub async fn run<F>(&self, images: &[ImagePayload], dispatch: F) -> BatchReport
    where
        F: Fn(ProcessAction) -> bool + Sync,
    {
        let dispatch = &dispatch;
        let analyzer = &self.analyzer;

        let mut completions = stream::iter(images.iter().enumerate())
            .map(|(index, image)| {
                let started = dispatch(ProcessAction::ItemStarted(index));
                async move {
                    if !started {
                        return (index, None);
                    }
                    (index, Some(analyzer.analyze(image).await))
                }
            })
            .buffer_unordered(self.concurrency);

        let mut receipts: Vec<(usize, ParsedReceipt)> = Vec::new();
        let mut failed = 0;
        let mut superseded = false;

        while let Some((index, result)) = completions.next().await {
            let delivered = match result {
                None => false,
                Some(Ok(receipt)) => {
                    let delivered = dispatch(ProcessAction::ItemSucceeded {
                        index,
                        receipt: receipt.clone(),
                    });
                    if delivered {
                        receipts.push((index, receipt));
                    }
                    delivered
                }
                Some(Err(err)) => {
                    log::debug!("Batch image {index} failed: {err}");
                    let delivered = dispatch(ProcessAction::ItemFailed {
                        index,
                        message: err.to_string(),
                    });
                    if delivered {
                        failed += 1;
                    }
                    delivered
                }
            };
            if !delivered {
                superseded = true;
                break;
            }
        }
        drop(completions);

        let succeeded = receipts.len();
        let report = |outcome| BatchReport {
            outcome,
            succeeded,
            failed,
        };
        if superseded {
            log::info!("Batch superseded after {succeeded} succeeded, {failed} failed");
            return report(BatchOutcome::Superseded);
        }

        if receipts.is_empty() {
            let message = format!("All {} images failed to scan", images.len());
            return if dispatch(ProcessAction::Failed(message)) {
                report(BatchOutcome::AllFailed)
            } else {
                report(BatchOutcome::Superseded)
            };
        }

        receipts.sort_by_key(|(index, _)| *index);
        let results = receipts.into_iter().map(|(_, receipt)| receipt).collect();
        if dispatch(ProcessAction::Succeeded(results)) {
            report(BatchOutcome::Completed)
        } else {
            report(BatchOutcome::Superseded)
        }
    }
}

//! Upload transmitter: delivers batches in bounded-concurrency waves.
//!
//! Batch 0 always goes alone because its response carries the document id
//! every later batch references. Remaining batches are grouped into waves of
//! `concurrency`; a wave starts only after the previous one has settled.

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::{Batch, BatchSink, CancelSignal, IngestError, RetryPolicy, SubmitAck};
use crate::models::DocumentStatus;

/// Tunables for one upload.
#[derive(Debug, Clone, Copy)]
pub struct TransmitterConfig {
    /// Maximum batches in flight at once.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Irrecoverably failed batches tolerated before the upload is aborted.
    pub failure_threshold: usize,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry: RetryPolicy::default(),
            failure_threshold: 3,
        }
    }
}

/// Outcome of an upload that was not aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub document_id: String,
    pub total_batches: u32,
    /// Batches that exhausted their retries without exceeding the threshold.
    pub failed_batches: Vec<u32>,
    /// Status reported by the store with the last accepted batch.
    pub status: DocumentStatus,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// Monotonic percentage of accepted batches.
#[derive(Debug)]
struct Progress {
    total: usize,
    done: usize,
    last: u8,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            done: 0,
            last: 0,
        }
    }

    fn advance(&mut self, n: usize) -> u8 {
        self.done += n;
        let pct = if self.total == 0 {
            100
        } else {
            ((self.done * 100 + self.total / 2) / self.total).min(100) as u8
        };
        self.last = self.last.max(pct);
        self.last
    }
}

/// Sends a planned upload through a [`BatchSink`].
pub struct Transmitter<S> {
    sink: S,
    config: TransmitterConfig,
}

impl<S: BatchSink> Transmitter<S> {
    pub fn new(sink: S, config: TransmitterConfig) -> Self {
        Self { sink, config }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Upload `batches` in order, calling `on_progress` after each wave.
    pub async fn upload<P>(
        &self,
        batches: &[Batch],
        cancel: &CancelSignal,
        mut on_progress: P,
    ) -> Result<UploadReport, IngestError>
    where
        P: FnMut(u8),
    {
        let (first, rest) = batches
            .split_first()
            .ok_or_else(|| IngestError::Validation("no batches to upload".to_string()))?;
        let total = batches.len();
        let mut progress = Progress::new(total);

        let ack = self.send(first, None, cancel).await?;
        let document_id = ack.id;
        let mut status = ack.status;
        info!("Created document {} ({} batches)", document_id, total);
        on_progress(progress.advance(1));

        let mut failed: Vec<u32> = Vec::new();
        for wave in rest.chunks(self.config.concurrency.max(1)) {
            if cancel.is_cancelled() {
                self.abandon(&document_id).await;
                return Err(IngestError::Cancelled);
            }

            debug!(
                "Sending wave of {} batches starting at {}",
                wave.len(),
                wave[0].index
            );
            let results = join_all(
                wave.iter()
                    .map(|batch| self.send(batch, Some(document_id.as_str()), cancel)),
            )
            .await;

            let mut accepted = 0;
            for (batch, result) in wave.iter().zip(results) {
                match result {
                    Ok(ack) => {
                        accepted += 1;
                        status = ack.status;
                    }
                    Err(IngestError::Transient(msg)) => {
                        warn!("Batch {} gave up after retries: {}", batch.index, msg);
                        failed.push(batch.index);
                    }
                    Err(err) => {
                        self.abandon(&document_id).await;
                        return Err(err);
                    }
                }
            }

            if failed.len() > self.config.failure_threshold {
                error!(
                    "Aborting upload of {}: {} batches failed",
                    document_id,
                    failed.len()
                );
                self.abandon(&document_id).await;
                return Err(IngestError::Aborted { failed });
            }

            on_progress(progress.advance(accepted));
        }

        Ok(UploadReport {
            document_id,
            total_batches: total as u32,
            failed_batches: failed,
            status,
        })
    }

    async fn send(
        &self,
        batch: &Batch,
        document_id: Option<&str>,
        cancel: &CancelSignal,
    ) -> Result<SubmitAck, IngestError> {
        let label = format!("batch {}/{}", batch.index + 1, batch.total);
        self.config
            .retry
            .run(&label, cancel, |_| self.sink.submit(batch, document_id))
            .await
    }

    async fn abandon(&self, document_id: &str) {
        if let Err(e) = self.sink.abort(document_id).await {
            warn!("Failed to mark document {} as failed: {}", document_id, e);
        }
    }
}

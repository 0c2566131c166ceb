//! Chunked document ingestion.
//!
//! Client side: [`batch`] slices rendered pages into batches and
//! [`transmitter`] delivers them in waves through a [`BatchSink`] with the
//! shared [`retry::RetryPolicy`]. Server side: [`reassemble`] holds the merge
//! rules the document repository applies to each incoming batch.

pub mod batch;
pub mod cancel;
pub mod client;
pub mod reassemble;
pub mod retry;
pub mod transmitter;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use batch::{plan_batches, Batch};
pub use cancel::{CancelHandle, CancelSignal};
pub use client::HttpIngestClient;
pub use retry::RetryPolicy;
pub use transmitter::{Transmitter, TransmitterConfig, UploadReport};
pub use types::{IngestCanvas, IngestRequest, SubmitAck};

/// Errors raised while building or transmitting an upload.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed request; never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Payload exceeds the server's size ceiling; retrying cannot help.
    #[error("payload too large: {0}")]
    SizeLimit(String),

    /// Network failure or 5xx response.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),

    #[error("upload aborted after {} failed batches", failed.len())]
    Aborted { failed: Vec<u32> },

    #[error("upload cancelled")]
    Cancelled,
}

impl IngestError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Destination for upload batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Submit one batch. `document_id` is `None` only for the first batch.
    async fn submit(
        &self,
        batch: &Batch,
        document_id: Option<&str>,
    ) -> Result<SubmitAck, IngestError>;

    /// Tell the store an upload was abandoned.
    async fn abort(&self, document_id: &str) -> Result<(), IngestError>;
}

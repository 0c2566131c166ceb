//! Wire types for the ingestion endpoint.

use serde::{Deserialize, Serialize};

use super::Batch;
use crate::models::{CategoryArrays, DocumentStatus};

/// Body of `POST /documents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub canvas_data: IngestCanvas,
}

/// Canvas payload of an ingestion request.
///
/// `documentId` absent means "create"; present means "merge this batch".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestCanvas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub pages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    /// Pages per batch; enables absolute placement at `chunkIndex * chunkSize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(flatten)]
    pub layers: CategoryArrays,
}

impl IngestRequest {
    pub fn from_batch(batch: &Batch, document_id: Option<&str>) -> Self {
        Self {
            name: batch.name.clone(),
            canvas_data: IngestCanvas {
                version: None,
                pages: batch.pages.clone(),
                current_page: batch.is_first().then_some(0),
                total_chunks: Some(batch.total),
                chunk_index: Some(batch.index),
                chunk_size: Some(batch.chunk_size),
                document_id: document_id.map(str::to_string),
                layers: CategoryArrays::default(),
            },
        }
    }
}

/// The parts of the server's document response the uploader needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    pub id: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub revision: i64,
}

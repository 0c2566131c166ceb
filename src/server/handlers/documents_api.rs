//! Document endpoints: listing, chunked ingestion, partial updates.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};

use super::super::auth::Owner;
use super::super::error::ApiError;
use super::super::AppState;
use crate::ingest::reassemble::{self, CanvasPatch};
use crate::ingest::IngestRequest;
use crate::models::{Document, DocumentStatus, DocumentSummary};

/// Body of `PATCH /documents/:id`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub canvas_data: Option<CanvasPatch>,
    #[serde(default)]
    pub expected_revision: Option<i64>,
}

/// `GET /documents`: the owner's documents, oldest first, without page data.
pub async fn list_documents(
    State(state): State<AppState>,
    owner: Owner,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let documents = state.doc_repo.list(Some(owner.id())).await?;
    Ok(Json(documents))
}

pub async fn get_document(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    state
        .doc_repo
        .get_owned(owner.id(), &id)
        .await?
        .map(Json)
        .ok_or_else(ApiError::document_not_found)
}

/// `POST /documents`: create from a first batch, or merge a follow-up batch
/// when `canvasData.documentId` is set.
pub async fn ingest_document(
    State(state): State<AppState>,
    owner: Owner,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let canvas = &request.canvas_data;

    if let Some(ref id) = canvas.document_id {
        let doc = state.doc_repo.merge_batch(owner.id(), id, canvas).await?;
        debug!(
            "Merged chunk {:?}/{:?} into {} ({} pages, {})",
            canvas.chunk_index,
            canvas.total_chunks,
            doc.id,
            doc.canvas.page_count(),
            doc.status.as_str()
        );
        return Ok((StatusCode::OK, Json(doc)));
    }

    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("name is required".to_string()))?;

    let initial = reassemble::initial_canvas(canvas)?;
    let chunked = initial.total_chunks.is_some();
    let mut doc = Document::new(
        uuid::Uuid::new_v4().to_string(),
        owner.0.clone(),
        name.to_string(),
        initial,
    );
    if chunked {
        doc.status = DocumentStatus::Ingesting;
    }

    state
        .doc_repo
        .create(&doc, chunked.then_some(0))
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// `PATCH /documents/:id`: omitted fields keep their stored values.
pub async fn update_document(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    payload: Result<Json<UpdateDocumentRequest>, JsonRejection>,
) -> Result<Json<Document>, ApiError> {
    let Json(request) = payload?;
    if let Some(ref name) = request.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("name must not be empty".to_string()));
        }
    }

    let doc = state
        .doc_repo
        .update(
            owner.id(),
            &id,
            request.name,
            request.canvas_data,
            request.expected_revision,
        )
        .await?;
    Ok(Json(doc))
}

pub async fn delete_document(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.doc_repo.delete(owner.id(), &id).await? {
        info!("Deleted document {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::document_not_found())
    }
}

/// `POST /documents/:id/abort`: the uploader gave up. A document that already
/// completed is left as is.
pub async fn abort_document(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
) -> Result<Json<DocumentSummary>, ApiError> {
    let doc = state
        .doc_repo
        .get_owned(owner.id(), &id)
        .await?
        .ok_or_else(ApiError::document_not_found)?;

    if doc.status == DocumentStatus::Complete {
        return Ok(Json(DocumentSummary::from(&doc)));
    }

    let doc = state
        .doc_repo
        .set_status(owner.id(), &id, DocumentStatus::Failed)
        .await?;
    info!(
        "Upload of document {} aborted with {} pages received",
        doc.id,
        doc.canvas.page_count()
    );
    Ok(Json(DocumentSummary::from(&doc)))
}

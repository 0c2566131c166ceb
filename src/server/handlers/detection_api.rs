//! Single-page detection writes.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::super::auth::Owner;
use super::super::error::ApiError;
use super::super::AppState;
use crate::models::LayerKey;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRequest {
    pub document_id: String,
    /// Data URL, base64 payload or remote URL of the rendered overlay.
    pub image_url: String,
    /// Defaults to the stored current page.
    #[serde(default)]
    pub current_page: Option<usize>,
    /// Target array; `pages` when omitted.
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub expected_revision: Option<i64>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResults {
    pub doors: Vec<serde_json::Value>,
    pub windows: Vec<serde_json::Value>,
    pub processing_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResponse {
    pub success: bool,
    pub image_url: String,
    pub layer_id: LayerKey,
    pub current_page: usize,
    pub revision: i64,
    pub detection_results: DetectionResults,
}

/// `POST /detection`: publish the image, then overwrite exactly one entry.
pub async fn record_detection(
    State(state): State<AppState>,
    owner: Owner,
    payload: Result<Json<DetectionRequest>, JsonRejection>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let Json(request) = payload?;
    let layer = match request.layer.as_deref() {
        None => LayerKey::Pages,
        Some(name) => LayerKey::from_str(name)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown layer '{}'", name)))?,
    };
    if request.image_url.trim().is_empty() {
        return Err(ApiError::BadRequest("imageUrl is required".to_string()));
    }

    // Fail fast before publishing anything.
    let doc = state
        .doc_repo
        .get_owned(owner.id(), &request.document_id)
        .await?
        .ok_or_else(ApiError::document_not_found)?;
    let page = request.current_page.unwrap_or(doc.canvas.current_page);
    if page >= doc.canvas.page_count() {
        return Err(ApiError::BadRequest(format!(
            "page {} out of range for {} pages",
            page,
            doc.canvas.page_count()
        )));
    }

    let image_url = state.image_store.store(&request.image_url).await?;
    let doc = state
        .doc_repo
        .write_entry(
            owner.id(),
            &doc.id,
            layer,
            Some(page),
            &image_url,
            request.expected_revision,
        )
        .await?;
    info!(
        "Stored {} detection for page {} of {} via {}",
        layer,
        page,
        doc.id,
        state.image_store.name()
    );

    Ok(Json(DetectionResponse {
        success: true,
        image_url,
        layer_id: layer,
        current_page: page,
        revision: doc.revision,
        detection_results: DetectionResults {
            processing_time: "0.00s".to_string(),
            ..Default::default()
        },
    }))
}

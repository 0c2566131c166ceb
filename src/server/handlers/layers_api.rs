//! Layer visibility: which overlay image the viewer should show for a page.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::super::auth::Owner;
use super::super::error::ApiError;
use super::super::AppState;
use crate::layers;
use crate::models::{LayerKey, ViewerToggles};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerVisibilityRequest {
    pub document_id: String,
    /// Base category being switched.
    #[serde(default)]
    pub layer_id: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
    /// Defaults to the stored current page.
    #[serde(default)]
    pub current_page: Option<usize>,
    /// State of the other toggles; all off when omitted.
    #[serde(default)]
    pub toggles: Option<ViewerToggles>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerVisibilityResponse {
    pub success: bool,
    pub image_url: String,
    /// Array the image was read from.
    pub layer_id: LayerKey,
    /// Key the toggles resolved to; differs from `layer_id` after a fallback.
    pub resolved_layer: LayerKey,
    pub visible: bool,
    pub current_page: usize,
    pub toggles: ViewerToggles,
}

/// `POST /layer-visibility`
pub async fn layer_visibility(
    State(state): State<AppState>,
    owner: Owner,
    payload: Result<Json<LayerVisibilityRequest>, JsonRejection>,
) -> Result<Json<LayerVisibilityResponse>, ApiError> {
    let Json(request) = payload?;
    let mut toggles = request.toggles.unwrap_or_default();
    let visible = request.visible.unwrap_or(true);

    if let Some(ref layer_id) = request.layer_id {
        let category = LayerKey::from_str(layer_id)
            .and_then(|key| key.base_category())
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "layerId must be single_doors, double_doors or windows, got '{}'",
                    layer_id
                ))
            })?;
        toggles.set(category, visible);
    }

    let doc = state
        .doc_repo
        .get_owned(owner.id(), &request.document_id)
        .await?
        .ok_or_else(ApiError::document_not_found)?;

    let page = request.current_page.unwrap_or(doc.canvas.current_page);
    let view = layers::resolve_image(page, &doc.canvas, toggles).ok_or_else(|| {
        ApiError::NotFound(format!("no image for page {} of {}", page, doc.id))
    })?;

    Ok(Json(LayerVisibilityResponse {
        success: true,
        image_url: view.image.to_string(),
        layer_id: view.source,
        resolved_layer: view.resolved,
        visible,
        current_page: page,
        toggles,
    }))
}

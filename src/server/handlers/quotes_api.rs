//! Takeoff and invoice records. The same handlers serve both ledgers; the
//! router injects the kind.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::super::auth::Owner;
use super::super::error::ApiError;
use super::super::AppState;
use crate::models::{Quote, QuoteKind, QuoteStatus};
use crate::repository::QuoteChanges;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuoteRequest {
    pub number: String,
    pub client_name: String,
    #[serde(default)]
    pub client_email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuoteRequest {
    pub number: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub status: Option<QuoteStatus>,
}

fn not_found(kind: QuoteKind) -> ApiError {
    ApiError::NotFound(format!("{} not found", kind.as_str()))
}

pub async fn list_quotes(
    State(state): State<AppState>,
    Extension(kind): Extension<QuoteKind>,
    owner: Owner,
) -> Result<Json<Vec<Quote>>, ApiError> {
    Ok(Json(state.quote_repo.list(owner.id(), kind).await?))
}

pub async fn create_quote(
    State(state): State<AppState>,
    Extension(kind): Extension<QuoteKind>,
    owner: Owner,
    payload: Result<Json<CreateQuoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Quote>), ApiError> {
    let Json(request) = payload?;
    if request.number.trim().is_empty() || request.client_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "number and clientName are required".to_string(),
        ));
    }

    let quote = Quote::new(
        owner.0,
        kind,
        request.number,
        request.client_name,
        request.client_email,
    );
    state.quote_repo.insert(&quote).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub async fn update_quote(
    State(state): State<AppState>,
    Extension(kind): Extension<QuoteKind>,
    owner: Owner,
    Path(id): Path<String>,
    payload: Result<Json<UpdateQuoteRequest>, JsonRejection>,
) -> Result<Json<Quote>, ApiError> {
    let Json(request) = payload?;
    let changes = QuoteChanges {
        number: request.number,
        client_name: request.client_name,
        client_email: request.client_email,
        status: request.status,
    };
    state
        .quote_repo
        .update(owner.id(), kind, &id, changes)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(kind))
}

pub async fn delete_quote(
    State(state): State<AppState>,
    Extension(kind): Extension<QuoteKind>,
    owner: Owner,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.quote_repo.delete(owner.id(), kind, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(kind))
    }
}

//! HTTP API for documents, chunked ingestion and the floor-plan viewer.
//!
//! - `/documents`: listing, chunked upload reassembly, partial updates
//! - `/detection` and `/layer-visibility`: per-page overlay writes and reads
//! - `/takeoffs` and `/invoices`: dashboard ledgers
//! - `/files`: images published by the local image store

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::Owner;
pub use error::ApiError;
pub use routes::create_router;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::repository::{DieselDocumentRepository, DieselQuoteRepository};
use crate::services::{build_image_store, ImageStore};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub doc_repo: Arc<DieselDocumentRepository>,
    pub quote_repo: Arc<DieselQuoteRepository>,
    pub image_store: Arc<dyn ImageStore>,
    /// Served at `/files`.
    pub images_dir: PathBuf,
    pub max_body_bytes: usize,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        settings.ensure_directories()?;
        let ctx = settings.create_db_context()?;
        ctx.init_schema().await?;

        let image_store = build_image_store(
            &settings.image_store,
            &settings.images_dir(),
            &settings.public_url,
            settings.request_timeout(),
        )?;

        Ok(Self {
            doc_repo: Arc::new(ctx.documents()),
            quote_repo: Arc::new(ctx.quotes()),
            image_store,
            images_dir: settings.images_dir(),
            max_body_bytes: settings.max_body_bytes,
        })
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let state = AppState::new(settings).await?;
    let image_backend = state.image_store.name().to_string();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(
        "Starting server at http://{} (images: {})",
        listener.local_addr()?,
        image_backend
    );

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use image::{DynamicImage, RgbImage};
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::repository::diesel_context::DieselDbContext;
    use crate::services::image_store::LocalImageStore;
    use crate::services::rasterizer::encode_data_url;

    const OWNER: &str = "user-1";

    async fn setup_test_app() -> (Router, tempfile::TempDir) {
        setup_test_app_with_limit(1024 * 1024).await
    }

    async fn setup_test_app_with_limit(max_body_bytes: usize) -> (Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let images_dir = dir.path().join("images");
        std::fs::create_dir_all(&images_dir).unwrap();

        let ctx = DieselDbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let state = AppState {
            doc_repo: Arc::new(ctx.documents()),
            quote_repo: Arc::new(ctx.quotes()),
            image_store: Arc::new(LocalImageStore::new(
                images_dir.clone(),
                "http://arcus.test",
                reqwest::Client::new(),
            )),
            images_dir,
            max_body_bytes,
        };

        (create_router(state), dir)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        owner: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(owner) = owner {
            request = request.header("x-user-id", owner);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn create_document(app: &Router, canvas: Value) -> String {
        let (status, json) = send(
            app,
            "POST",
            "/documents",
            Some(OWNER),
            Some(json!({ "name": "Level 1", "canvasData": canvas })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_missing_owner_is_unauthorized() {
        let (app, _dir) = setup_test_app().await;

        let (status, json) = send(&app, "GET", "/documents", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");

        let (status, _) = send(&app, "GET", "/documents", Some("  "), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chunked_ingest_out_of_order() {
        let (app, _dir) = setup_test_app().await;

        let (status, first) = send(
            &app,
            "POST",
            "/documents",
            Some(OWNER),
            Some(json!({
                "name": "Tower B",
                "canvasData": {
                    "pages": ["p0", "p1"],
                    "totalChunks": 3,
                    "chunkIndex": 0,
                    "chunkSize": 2
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["status"], "ingesting");
        let id = first["id"].as_str().unwrap().to_string();

        for (index, pages) in [(2, json!(["p4"])), (1, json!(["p2", "p3"]))] {
            let (status, _) = send(
                &app,
                "POST",
                "/documents",
                Some(OWNER),
                Some(json!({
                    "canvasData": {
                        "pages": pages,
                        "totalChunks": 3,
                        "chunkIndex": index,
                        "chunkSize": 2,
                        "documentId": id
                    }
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, doc) = send(&app, "GET", &format!("/documents/{}", id), Some(OWNER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["canvasData"]["pages"], json!(["p0", "p1", "p2", "p3", "p4"]));
        assert_eq!(doc["status"], "complete");
        assert!(doc["canvasData"].get("totalChunks").is_none());

        let (_, list) = send(&app, "GET", "/documents", Some(OWNER), None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["pageCount"], 5);
        assert!(list[0].get("canvasData").is_none());
    }

    #[tokio::test]
    async fn test_malformed_chunk_headers_are_rejected() {
        let (app, _dir) = setup_test_app().await;

        let (status, first) = send(
            &app,
            "POST",
            "/documents",
            Some(OWNER),
            Some(json!({
                "name": "Tower B",
                "canvasData": {
                    "pages": ["p0", "p1"],
                    "totalChunks": 3,
                    "chunkIndex": 0,
                    "chunkSize": 2
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = first["id"].as_str().unwrap().to_string();

        let headers = [
            // past the stored total
            json!({"chunkIndex": 5, "chunkSize": 2}),
            // chunk size differs from the first batch
            json!({"chunkIndex": 1, "chunkSize": 3, "totalChunks": 3}),
            // total changed mid-upload
            json!({"chunkIndex": 1, "chunkSize": 2, "totalChunks": 4}),
            json!({"chunkIndex": 4294967294u32, "chunkSize": 4294967295u32, "totalChunks": 4294967295u32}),
        ];
        for header in headers {
            let mut canvas = header.clone();
            canvas["pages"] = json!(["x", "y"]);
            canvas["documentId"] = json!(id);
            let (status, body) = send(
                &app,
                "POST",
                "/documents",
                Some(OWNER),
                Some(json!({ "canvasData": canvas })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", header);
            assert_eq!(body["error"]["code"], "BAD_REQUEST");
        }

        let (status, doc) = send(&app, "GET", &format!("/documents/{}", id), Some(OWNER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["canvasData"]["pages"], json!(["p0", "p1"]));
        assert_eq!(doc["canvasData"]["totalChunks"], 3);
        assert_eq!(doc["canvasData"]["chunkSize"], 2);
        assert_eq!(doc["status"], "ingesting");
        assert_eq!(doc["revision"], 0);
    }

    #[tokio::test]
    async fn test_ingest_errors() {
        let (app, _dir) = setup_test_app().await;

        // pages must be a sequence
        let (status, _) = send(
            &app,
            "POST",
            "/documents",
            Some(OWNER),
            Some(json!({ "name": "x", "canvasData": { "pages": "p0" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/documents",
            Some(OWNER),
            Some(json!({ "canvasData": { "pages": ["p0"] } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/documents",
            Some(OWNER),
            Some(json!({
                "canvasData": { "pages": ["p2"], "chunkIndex": 1, "documentId": "missing" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (app, _dir) = setup_test_app_with_limit(512).await;
        let big = "x".repeat(2048);

        let (status, json) = send(
            &app,
            "POST",
            "/documents",
            Some(OWNER),
            Some(json!({ "name": "big", "canvasData": { "pages": [big] } })),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_patch_preserves_omitted_fields() {
        let (app, _dir) = setup_test_app().await;
        let id = create_document(
            &app,
            json!({ "pages": ["p0", "p1"], "single_doors": ["sd0", ""] }),
        )
        .await;
        let uri = format!("/documents/{}", id);

        let (status, doc) = send(&app, "PATCH", &uri, Some(OWNER), Some(json!({ "name": "Renamed" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["name"], "Renamed");
        assert_eq!(doc["canvasData"]["single_doors"], json!(["sd0"]));
        assert_eq!(doc["canvasData"]["pages"], json!(["p0", "p1"]));

        let revision = doc["revision"].as_i64().unwrap();
        let (status, doc) = send(
            &app,
            "PATCH",
            &uri,
            Some(OWNER),
            Some(json!({
                "canvasData": { "currentPage": 1, "windows": ["", "w1"] },
                "expectedRevision": revision
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["canvasData"]["currentPage"], 1);
        assert_eq!(doc["canvasData"]["windows"], json!(["", "w1"]));
        assert_eq!(doc["canvasData"]["single_doors"], json!(["sd0"]));

        // Stale revision
        let (status, json) = send(
            &app,
            "PATCH",
            &uri,
            Some(OWNER),
            Some(json!({ "name": "Lost", "expectedRevision": revision })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_documents_are_scoped_to_owner() {
        let (app, _dir) = setup_test_app().await;
        let id = create_document(&app, json!({ "pages": ["p0"] })).await;
        let uri = format!("/documents/{}", id);

        let (status, _) = send(&app, "GET", &uri, Some("someone-else"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &uri, Some("someone-else"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", &uri, Some(OWNER), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &uri, Some(OWNER), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_abort_marks_ingesting_document_failed() {
        let (app, _dir) = setup_test_app().await;
        let id = create_document(
            &app,
            json!({ "pages": ["p0"], "totalChunks": 4, "chunkIndex": 0, "chunkSize": 1 }),
        )
        .await;

        let (status, summary) = send(
            &app,
            "POST",
            &format!("/documents/{}/abort", id),
            Some(OWNER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["status"], "failed");
    }

    #[tokio::test]
    async fn test_layer_visibility_resolves_and_falls_back() {
        let (app, _dir) = setup_test_app().await;
        let id = create_document(
            &app,
            json!({
                "pages": ["p0", "p1"],
                "single_doors": ["sd0", ""],
                "windows": ["w0", ""],
                "single_doors_and_windows": ["sdw0", ""]
            }),
        )
        .await;

        let (status, json) = send(
            &app,
            "POST",
            "/layer-visibility",
            Some(OWNER),
            Some(json!({
                "documentId": id,
                "layerId": "windows",
                "visible": true,
                "currentPage": 0,
                "toggles": { "singleDoors": true }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["imageUrl"], "sdw0");
        assert_eq!(json["layerId"], "single_doors_and_windows");

        // Nothing detected on page 1
        let (_, json) = send(
            &app,
            "POST",
            "/layer-visibility",
            Some(OWNER),
            Some(json!({
                "documentId": id,
                "layerId": "windows",
                "visible": true,
                "currentPage": 1,
                "toggles": { "singleDoors": true, "doubleDoors": true }
            })),
        )
        .await;
        assert_eq!(json["imageUrl"], "p1");
        assert_eq!(json["layerId"], "pages");

        let (status, _) = send(
            &app,
            "POST",
            "/layer-visibility",
            Some(OWNER),
            Some(json!({ "documentId": id, "layerId": "doors", "visible": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_detection_publishes_and_writes_one_entry() {
        let (app, _dir) = setup_test_app().await;
        let id = create_document(&app, json!({ "pages": ["p0", "p1", "p2"] })).await;

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 255])));
        let (status, json) = send(
            &app,
            "POST",
            "/detection",
            Some(OWNER),
            Some(json!({
                "documentId": id,
                "imageUrl": encode_data_url(&img).unwrap(),
                "currentPage": 2,
                "layer": "double_doors"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["detectionResults"]["processingTime"], "0.00s");
        let url = json["imageUrl"].as_str().unwrap().to_string();
        assert!(url.starts_with("http://arcus.test/files/"));

        let (_, doc) = send(&app, "GET", &format!("/documents/{}", id), Some(OWNER), None).await;
        assert_eq!(doc["canvasData"]["double_doors"], json!(["", "", url]));
        assert_eq!(doc["canvasData"]["pages"], json!(["p0", "p1", "p2"]));

        // Served back from the image directory.
        let path = url.trim_start_matches("http://arcus.test");
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, _) = send(
            &app,
            "POST",
            "/detection",
            Some(OWNER),
            Some(json!({ "documentId": id, "imageUrl": "aGVsbG8=", "currentPage": 9 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_takeoff_and_invoice_ledgers() {
        let (app, _dir) = setup_test_app().await;

        let (status, created) = send(
            &app,
            "POST",
            "/takeoffs",
            Some(OWNER),
            Some(json!({
                "number": "T-100",
                "clientName": "Northwind",
                "clientEmail": "pm@northwind.test"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "Pending");
        assert_eq!(created["kind"], "takeoff");
        let id = created["id"].as_str().unwrap();

        let (_, invoices) = send(&app, "GET", "/invoices", Some(OWNER), None).await;
        assert!(invoices.as_array().unwrap().is_empty());

        let (status, updated) = send(
            &app,
            "PATCH",
            &format!("/takeoffs/{}", id),
            Some(OWNER),
            Some(json!({ "status": "Approved" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "Approved");

        // Not visible under the other ledger.
        let (status, _) = send(&app, "DELETE", &format!("/invoices/{}", id), Some(OWNER), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", &format!("/takeoffs/{}", id), Some(OWNER), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, takeoffs) = send(&app, "GET", "/takeoffs", Some(OWNER), None).await;
        assert!(takeoffs.as_array().unwrap().is_empty());
    }
}

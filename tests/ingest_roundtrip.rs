//! End-to-end upload against a live server on an ephemeral port.

use std::time::Duration;

use arcus::config::Settings;
use arcus::ingest::{
    cancel, plan_batches, BatchSink, HttpIngestClient, IngestError, RetryPolicy, Transmitter,
    TransmitterConfig,
};
use arcus::models::{Document, DocumentStatus};
use arcus::server::{create_router, AppState};
use tempfile::TempDir;

const OWNER: &str = "user-7";

async fn start_server() -> (String, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let mut settings = Settings::with_data_dir(dir.path().to_path_buf());
    settings.public_url = base_url.clone();
    let state = AppState::new(&settings).await.unwrap();
    let app = create_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base_url, dir)
}

fn transmitter(base_url: &str) -> Transmitter<HttpIngestClient> {
    let client = HttpIngestClient::new(base_url, OWNER, Duration::from_secs(10)).unwrap();
    Transmitter::new(
        client,
        TransmitterConfig {
            concurrency: 3,
            retry: RetryPolicy::new(2, Duration::from_millis(10)),
            failure_threshold: 3,
        },
    )
}

async fn fetch(base_url: &str, id: &str) -> Document {
    reqwest::Client::new()
        .get(format!("{}/documents/{}", base_url, id))
        .header("x-user-id", OWNER)
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_chunked_upload_reassembles_in_order() {
    let (base_url, _dir) = start_server().await;
    let pages: Vec<String> = (0..7).map(|i| format!("https://cdn.test/p{}.png", i)).collect();
    let batches = plan_batches("Ground floor", pages.clone(), 2).unwrap();
    assert_eq!(batches.len(), 4);

    let (_handle, signal) = cancel::channel();
    let mut seen = Vec::new();
    let report = transmitter(&base_url)
        .upload(&batches, &signal, |pct| seen.push(pct))
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.total_batches, 4);
    assert_eq!(report.status, DocumentStatus::Complete);
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));

    let doc = fetch(&base_url, &report.document_id).await;
    assert_eq!(doc.name, "Ground floor");
    assert_eq!(doc.owner_id, OWNER);
    assert_eq!(doc.status, DocumentStatus::Complete);
    assert_eq!(doc.canvas.pages, pages);
    assert_eq!(doc.canvas.total_chunks, None);
}

#[tokio::test]
async fn test_single_batch_upload_is_complete_immediately() {
    let (base_url, _dir) = start_server().await;
    let batches = plan_batches("Roof", vec!["https://cdn.test/r.png".to_string()], 2).unwrap();

    let (_handle, signal) = cancel::channel();
    let report = transmitter(&base_url)
        .upload(&batches, &signal, |_| {})
        .await
        .unwrap();

    assert_eq!(report.total_batches, 1);
    assert_eq!(report.status, DocumentStatus::Complete);
    let doc = fetch(&base_url, &report.document_id).await;
    assert_eq!(doc.canvas.page_count(), 1);
}

#[tokio::test]
async fn test_batch_for_missing_document_is_not_found() {
    let (base_url, _dir) = start_server().await;
    let pages: Vec<String> = (0..4).map(|i| format!("p{}", i)).collect();
    let batches = plan_batches("Orphan", pages, 2).unwrap();

    let client = HttpIngestClient::new(&base_url, OWNER, Duration::from_secs(10)).unwrap();
    let err = client
        .submit(&batches[1], Some("no-such-document"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NotFound(_)), "got {:?}", err);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_other_owner_cannot_see_upload() {
    let (base_url, _dir) = start_server().await;
    let batches = plan_batches("Private", vec!["p0".to_string()], 2).unwrap();

    let (_handle, signal) = cancel::channel();
    let report = transmitter(&base_url)
        .upload(&batches, &signal, |_| {})
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .get(format!("{}/documents/{}", base_url, report.document_id))
        .header("x-user-id", "someone-else")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

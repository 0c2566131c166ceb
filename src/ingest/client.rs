//! HTTP batch sink talking to an arcus server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{Batch, BatchSink, IngestError, IngestRequest, SubmitAck};

/// Header carrying the owner id; set by the fronting auth proxy in production.
pub const USER_ID_HEADER: &str = "x-user-id";

const USER_AGENT: &str = concat!("arcus/", env!("CARGO_PKG_VERSION"));

/// Sends batches to `POST {base}/documents`.
#[derive(Clone)]
pub struct HttpIngestClient {
    client: Client,
    base_url: String,
    user_id: String,
}

impl HttpIngestClient {
    pub fn new(base_url: &str, user_id: &str, timeout: Duration) -> Result<Self, IngestError> {
        let parsed = url::Url::parse(base_url).map_err(|e| {
            IngestError::Validation(format!("invalid server URL '{}': {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(IngestError::Validation(format!(
                "server URL must be http or https: {}",
                base_url
            )));
        }
        if user_id.trim().is_empty() {
            return Err(IngestError::Validation("owner id must not be empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| IngestError::Fatal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl BatchSink for HttpIngestClient {
    async fn submit(
        &self,
        batch: &Batch,
        document_id: Option<&str>,
    ) -> Result<SubmitAck, IngestError> {
        let url = format!("{}/documents", self.base_url);
        let body = IngestRequest::from_batch(batch, document_id);
        debug!(
            "POST {} batch {}/{} ({} pages)",
            url,
            batch.index + 1,
            batch.total,
            batch.pages.len()
        );

        let response = self
            .client
            .post(&url)
            .header(USER_ID_HEADER, &self.user_id)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify(status, &text));
        }

        response
            .json::<SubmitAck>()
            .await
            .map_err(|e| IngestError::Transient(format!("unreadable response: {}", e)))
    }

    async fn abort(&self, document_id: &str) -> Result<(), IngestError> {
        let url = format!("{}/documents/{}/abort", self.base_url, document_id);
        let response = self
            .client
            .post(&url)
            .header(USER_ID_HEADER, &self.user_id)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(classify(status, &text))
        }
    }
}

fn transport_error(e: reqwest::Error) -> IngestError {
    IngestError::Transient(e.to_string())
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a non-success response to the error taxonomy.
pub fn classify(status: StatusCode, body: &str) -> IngestError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| status.to_string());

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            IngestError::Validation(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IngestError::Unauthorized(message),
        StatusCode::NOT_FOUND => IngestError::NotFound(message),
        StatusCode::PAYLOAD_TOO_LARGE => IngestError::SizeLimit(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            IngestError::Transient(message)
        }
        s if s.is_server_error() => IngestError::Transient(message),
        _ => IngestError::Fatal(format!("{}: {}", status, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_configuration() {
        let timeout = Duration::from_secs(5);
        assert!(HttpIngestClient::new("http://127.0.0.1:3030/", "u1", timeout).is_ok());
        assert!(matches!(
            HttpIngestClient::new("not a url", "u1", timeout),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(
            HttpIngestClient::new("ftp://host/", "u1", timeout),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(
            HttpIngestClient::new("http://host/", "  ", timeout),
            Err(IngestError::Validation(_))
        ));

        let client = HttpIngestClient::new("http://host:1/api/", "u1", timeout).unwrap();
        assert_eq!(client.base_url(), "http://host:1/api");
    }

    #[test]
    fn test_classify_status_codes() {
        let body = r#"{"error":{"code":"NOT_FOUND","message":"Document not found"}}"#;
        match classify(StatusCode::NOT_FOUND, body) {
            IngestError::NotFound(msg) => assert_eq!(msg, "Document not found"),
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            classify(StatusCode::PAYLOAD_TOO_LARGE, ""),
            IngestError::SizeLimit(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "garbage"),
            IngestError::Validation(_)
        ));
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, ""),
            IngestError::Unauthorized(_)
        ));
        assert!(classify(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(!classify(StatusCode::CONFLICT, "").is_retryable());
    }
}

//! Assistant backend transport
//!
//! Issues the streaming ask request and hands back the raw body chunks.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::config::ChatConfig;

/// Body chunks of a streaming response, in arrival order
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, BackendError>>;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Backend returned status {0}")]
    Status(u16),
    #[error("Response has no body")]
    MissingBody,
    #[error("Stream read failed: {0}")]
    Stream(String),
}

/// Body of `POST /ask_stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    /// User text with the page-context block appended
    pub query: String,
    pub page_url: String,
}

/// The backend assistant service
#[async_trait]
pub trait AskBackend: Send + Sync {
    /// Send a query. Resolves once response headers are in and the status is a success.
    async fn ask_stream(&self, request: AskRequest) -> Result<ChunkStream, BackendError>;
}

/// HTTP implementation over reqwest
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(config: &ChatConfig) -> Result<Self, BackendError> {
        // No overall timeout: the stream runs until the server closes it
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.ask_stream_url(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AskBackend for HttpBackend {
    async fn ask_stream(&self, request: AskRequest) -> Result<ChunkStream, BackendError> {
        tracing::debug!(endpoint = %self.endpoint, page_url = %request.page_url, "Sending ask request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(BackendError::MissingBody);
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| BackendError::Stream(e.to_string()))
            })
            .boxed();
        Ok(chunks)
    }
}

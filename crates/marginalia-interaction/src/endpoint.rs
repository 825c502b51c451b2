//! Chunked transport to the streaming completion endpoint.

use crate::prompt::StreamRequest;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use marginalia_core::error::{MarginaliaError, Result};
use marginalia_core::settings::Settings;
use reqwest::Client;

/// Raw frames in delivery order.
pub type FrameStream = BoxStream<'static, Result<Vec<u8>>>;

/// Opens a streamed completion.
#[async_trait]
pub trait StreamingEndpoint: Send + Sync {
    /// # Errors
    ///
    /// `TransportFailure` for network errors and non-2xx responses.
    async fn open(&self, request: &StreamRequest) -> Result<FrameStream>;
}

/// Endpoint implementation that posts to `{backend_url}/api/stream`.
#[derive(Clone)]
pub struct HttpStreamingEndpoint {
    client: Client,
    url: String,
}

impl HttpStreamingEndpoint {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| MarginaliaError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: settings.stream_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamingEndpoint for HttpStreamingEndpoint {
    async fn open(&self, request: &StreamRequest) -> Result<FrameStream> {
        let response = self
            .client
            .post(&self.url)
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|err| {
                MarginaliaError::transport(None, format!("Stream request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(MarginaliaError::transport(Some(status.as_u16()), body_text));
        }

        tracing::debug!("[Stream] Opened {} ({})", self.url, status);
        let frames = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| MarginaliaError::transport(None, format!("Stream interrupted: {err}")))
        });
        Ok(frames.boxed())
    }
}

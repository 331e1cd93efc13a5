use crate::config::{OversizePolicy, ResizerConfig};
use crate::ResizeError;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// Source of raw image bytes for URL-mode requests.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, ResizeError>;
}

/// Downloads source images over HTTP(S).
///
/// Validation is shallow; the coordinator decodes the payload
/// afterwards:
/// 1. The response status must be exactly 200
/// 2. The declared Content-Type must be `image/*`
/// 3. The body is read through a reader capped at `max_size` bytes
///
/// The request timeout is fixed at construction and does not follow any
/// deadline of the inbound request.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_size: usize,
    oversize: OversizePolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_size: usize, oversize: OversizePolicy) -> Result<Self, ResizeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResizeError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self { client, max_size, oversize })
    }

    pub fn from_config(cfg: &ResizerConfig) -> Result<Self, ResizeError> {
        Self::new(cfg.fetch_timeout, cfg.max_download_size, cfg.oversize_policy)
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ResizeError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ResizeError::Fetch(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ResizeError::Fetch(format!("HTTP {}", status)));
        }

        // Only the declared type is checked; the payload is decoded later.
        let ct = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !ct.starts_with("image/") {
            return Err(ResizeError::Fetch(format!(
                "URL does not point to an image (content-type: {})",
                ct
            )));
        }

        if self.oversize == OversizePolicy::Reject {
            if let Some(len) = resp.content_length() {
                if len > self.max_size as u64 {
                    return Err(ResizeError::Fetch("Input exceeds size limit".into()));
                }
            }
        }

        // Read one byte past the cap so an oversized body can be told apart
        // from one that is exactly `max_size` long.
        let stream = resp.bytes_stream().map_err(std::io::Error::other);
        let reader = StreamReader::new(stream).take(self.max_size as u64 + 1);
        tokio::pin!(reader);
        let mut buf = Vec::with_capacity(8192);
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ResizeError::Fetch(e.to_string()))?;

        if buf.len() > self.max_size {
            match self.oversize {
                OversizePolicy::Reject => {
                    return Err(ResizeError::Fetch("Input exceeds size limit".into()));
                }
                OversizePolicy::Truncate => {
                    tracing::warn!("Source {} exceeds {} bytes; truncating", url, self.max_size);
                    buf.truncate(self.max_size);
                }
            }
        }

        Ok(Bytes::from(buf))
    }
}

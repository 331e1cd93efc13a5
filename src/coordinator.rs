//! Request coordination: validation, cache lookup, transform and cache fill.

use crate::cache::{Cache, CacheKey};
use crate::transform::params::ResizeOptions;
use crate::transform::ImageTransformer;
use crate::{ResizeError, Result};
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A transformed image ready to be written to the client.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub key: CacheKey,
    pub cache_hit: bool,
}

/// Request counters
#[derive(Debug, Default)]
pub struct Metrics {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Transforms that produced output.
    pub transforms: AtomicU64,
    pub transform_failures: AtomicU64,
    /// Requests that ended in any error, validation included.
    pub failed_requests: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub transforms: u64,
    pub transform_failures: u64,
    pub failed_requests: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            transforms: self.transforms.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

/// Runs raw image bytes through validation, the result cache and the
/// transformer.
///
/// Concurrent misses for the same key are not coalesced: each one invokes
/// the transformer and writes the cache, and the last write wins. Results for
/// a key are interchangeable, so this only costs duplicate work.
pub struct ResizeService {
    cache: Arc<dyn Cache>,
    transformer: Arc<dyn ImageTransformer>,
    metrics: Metrics,
}

impl ResizeService {
    pub fn new(cache: Arc<dyn Cache>, transformer: Arc<dyn ImageTransformer>) -> Self {
        Self { cache, transformer, metrics: Metrics::default() }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn process(&self, input: Bytes, options: ResizeOptions) -> Result<ProcessedImage> {
        let result = self.process_inner(input, options).await;
        if result.is_err() {
            self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn process_inner(&self, input: Bytes, options: ResizeOptions) -> Result<ProcessedImage> {
        if input.is_empty() {
            return Err(ResizeError::Validation("image is empty".into()));
        }

        self.transformer
            .validate(&input)
            .map_err(|e| ResizeError::Validation(e.to_string()))?;

        let options = options.normalized()?;
        let key = CacheKey::derive(&input, &options);
        let content_type = options.content_type();

        if let Some(bytes) = self.cache.get(&key) {
            tracing::debug!("Cache hit for key={}", key);
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(ProcessedImage { bytes, content_type, key, cache_hit: true });
        }

        tracing::debug!(
            "Cache miss for key={}, transforming to {}x{} {} q={}",
            key, options.width, options.height, options.format, options.quality
        );
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);

        let transformer = Arc::clone(&self.transformer);
        let output = tokio::task::spawn_blocking(move || transformer.transform(&input, &options))
            .await
            .map_err(|e| ResizeError::Internal(format!("transform task failed: {}", e)))?
            .map_err(|e| {
                tracing::error!("Transform failed for key={}: {}", key, e);
                self.metrics.transform_failures.fetch_add(1, Ordering::Relaxed);
                ResizeError::Transform(e.to_string())
            })?;
        self.metrics.transforms.fetch_add(1, Ordering::Relaxed);

        let bytes = Bytes::from(output);
        self.cache.set(key.clone(), bytes.clone());

        Ok(ProcessedImage { bytes, content_type, key, cache_hit: false })
    }
}

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod transform;

use crate::cache::{etag_for_key, Cache};
use crate::config::{ResizerConfig, DEFAULT_CACHE_CONTROL};
use crate::coordinator::{ProcessedImage, ResizeService};
use crate::fetch::SourceFetcher;
use crate::transform::params::ResizeParams;

/// Slack on top of the upload ceiling for the multipart envelope and the
/// small form fields that travel with the file.
const MULTIPART_ENVELOPE_ALLOWANCE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("{0}")]
    Validation(String),
    #[error("Failed to download image: {0}")]
    Fetch(String),
    #[error("Failed to process image: {0}")]
    Transform(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResizeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResizeError::Validation(_) | ResizeError::Fetch(_) => StatusCode::BAD_REQUEST,
            ResizeError::Transform(_) | ResizeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResizeError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ResizeError>;

/// Shared handler state: one coordinator (and so one cache) per process.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ResizeService>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub max_upload_size: usize,
}

impl AppState {
    pub fn new(service: Arc<ResizeService>, fetcher: Arc<dyn SourceFetcher>, config: &ResizerConfig) -> Self {
        Self { service, fetcher, max_upload_size: config.max_upload_size }
    }
}

fn image_response(image: ProcessedImage) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(image.content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(image.bytes.len()));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(DEFAULT_CACHE_CONTROL));
    if let Ok(etag) = HeaderValue::from_str(&etag_for_key(&image.key)) {
        headers.insert(header::ETAG, etag);
    }
    (StatusCode::OK, headers, Body::from(image.bytes)).into_response()
}

/// GET /resize: fetch the source by URL, then resize.
async fn resize_from_url(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response> {
    let params: ResizeParams = query
        .unwrap_or_default()
        .parse()
        .map_err(|e| ResizeError::Validation(format!("Invalid query: {}", e)))?;

    tracing::debug!(
        "Processing image request: url={:?}, width={:?}, height={:?}, quality={:?}, format={:?}",
        params.url, params.width, params.height, params.quality, params.format
    );

    let url = match params.url.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => u.to_string(),
        _ => return Err(ResizeError::Validation("URL parameter is required".into())),
    };
    if reqwest::Url::parse(&url).is_err() {
        return Err(ResizeError::Validation(format!("Invalid URL: {}", url)));
    }

    // Reject bad dimensions before spending a download on them.
    let options = params.into_options()?;

    let source = state.fetcher.fetch(&url).await.map_err(|e| {
        tracing::warn!("Failed to fetch {}: {}", url, e);
        e
    })?;

    let image = state.service.process(source, options).await?;
    Ok(image_response(image))
}

/// Compares the declared size of an upload against the ceiling without
/// touching the body. An absent declaration passes; the transport body limit
/// still bounds what can actually be read.
pub fn check_declared_upload_size(declared: Option<u64>, max: usize) -> Result<()> {
    match declared {
        Some(size) if size > max as u64 => Err(upload_too_large(max)),
        _ => Ok(()),
    }
}

/// Same check against a whole multipart request, which also carries the
/// envelope and the other form fields.
pub fn check_declared_request_size(declared: Option<u64>, max: usize) -> Result<()> {
    match declared {
        Some(size) if size > max.saturating_add(MULTIPART_ENVELOPE_ALLOWANCE) as u64 => Err(upload_too_large(max)),
        _ => Ok(()),
    }
}

fn upload_too_large(max: usize) -> ResizeError {
    const MIB: usize = 1024 * 1024;
    let limit = if max >= MIB && max % MIB == 0 {
        format!("{}MB", max / MIB)
    } else {
        format!("{} bytes", max)
    };
    ResizeError::Validation(format!("File size too large (max {})", limit))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// POST /resize: multipart upload with an `image` file field.
async fn resize_from_upload(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut file_bytes: Option<Bytes> = None;
    let mut params = ResizeParams::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ResizeError::Validation(format!("Invalid multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "image" {
            // Clients rarely label the part itself; fall back to the request length.
            match declared_length(field.headers()) {
                Some(len) => check_declared_upload_size(Some(len), state.max_upload_size)?,
                None => check_declared_request_size(declared_length(&request_headers), state.max_upload_size)?,
            }

            let bytes = field.bytes().await.map_err(|e| {
                tracing::error!("Failed to read uploaded file: {}", e);
                ResizeError::Internal("Failed to read uploaded file".into())
            })?;
            file_bytes = Some(bytes);
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ResizeError::Validation(format!("Invalid form field {}: {}", name, e)))?;
        let number = |name: &str| {
            text.trim()
                .parse::<i64>()
                .map_err(|_| ResizeError::Validation(format!("Invalid {}: {}", name, text)))
        };
        match name.as_str() {
            "width" => params.width = Some(number("width")?),
            "height" => params.height = Some(number("height")?),
            "quality" if !text.trim().is_empty() => params.quality = Some(number("quality")?),
            "format" => params.format = Some(text.trim().to_string()),
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| ResizeError::Validation("No image file provided".into()))?;
    let options = params.into_options()?;

    let image = state.service.process(bytes, options).await?;
    Ok(image_response(image))
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": time::OffsetDateTime::now_utc().unix_timestamp(),
        "cache_size": state.service.cache().size(),
    }))
}

/// Cache and request counters
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.service.metrics().snapshot();
    let lookups = m.cache_hits + m.cache_misses;
    let hit_rate = if lookups > 0 {
        (m.cache_hits as f64 / lookups as f64) * 100.0
    } else {
        0.0
    };

    Json(json!({
        "cache": {
            "entry_count": state.service.cache().size(),
        },
        "requests": {
            "cache_hits": m.cache_hits,
            "cache_misses": m.cache_misses,
            "hit_rate_percent": hit_rate,
            "failed": m.failed_requests,
        },
        "transforms": {
            "completed": m.transforms,
            "failed": m.transform_failures,
        }
    }))
}

/// Static service description
async fn index_handler() -> impl IntoResponse {
    Json(json!({
        "name": "resizekit",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "A fast image resizing and optimization service",
        "endpoints": {
            "GET /resize": {
                "description": "Resize image from URL",
                "parameters": {
                    "url": "Image URL (required)",
                    "width": "Target width (required)",
                    "height": "Target height (required)",
                    "quality": "Quality 1-100 (optional, default: 80)",
                    "format": "Output format: jpeg, png, webp (optional, default: jpeg)",
                },
                "example": "/resize?url=https://example.com/image.jpg&width=400&height=300&quality=85&format=jpeg",
            },
            "POST /resize": {
                "description": "Resize uploaded image",
                "parameters": {
                    "image": "Image file (multipart/form-data, required, max 10MB)",
                    "width": "Target width (required)",
                    "height": "Target height (required)",
                    "quality": "Quality 1-100 (optional, default: 80)",
                    "format": "Output format: jpeg, png, webp (optional, default: jpeg)",
                },
            },
            "GET /health": { "description": "Health check endpoint" },
            "GET /stats": { "description": "Cache and request counters" },
        },
    }))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let body_limit = state.max_upload_size + MULTIPART_ENVELOPE_ALLOWANCE;

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route(
            "/resize",
            get(resize_from_url)
                .post(resize_from_upload)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes_map_to_status() {
        assert_eq!(ResizeError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ResizeError::Fetch("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ResizeError::Transform("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ResizeError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn declared_upload_size_guard() {
        let max = 10 * 1024 * 1024;
        assert!(check_declared_upload_size(None, max).is_ok());
        assert!(check_declared_upload_size(Some(max as u64), max).is_ok());
        let err = check_declared_upload_size(Some(max as u64 + 1), max).unwrap_err();
        assert!(matches!(err, ResizeError::Validation(msg) if msg.contains("10MB")));
    }

    #[test]
    fn declared_request_size_allows_for_envelope() {
        let max = 10 * 1024 * 1024;
        assert!(check_declared_request_size(None, max).is_ok());
        assert!(check_declared_request_size(Some(max as u64 + 512), max).is_ok());
        let limit = (max + MULTIPART_ENVELOPE_ALLOWANCE) as u64;
        assert!(check_declared_request_size(Some(limit), max).is_ok());
        assert!(check_declared_request_size(Some(limit + 1), max).is_err());
    }

    #[test]
    fn small_ceilings_are_reported_in_bytes() {
        let err = check_declared_upload_size(Some(4096), 2048).unwrap_err();
        assert_eq!(err.to_string(), "File size too large (max 2048 bytes)");
    }
}

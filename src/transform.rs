pub mod params;

use crate::transform::params::{OutputFormat, ResizeOptions};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use std::io::Cursor;
use thiserror::Error;

/// Failures reported by a transformer.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("invalid image format: {0}")]
    InvalidImage(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("{0}")]
    Processing(String),
}

/// The image codec boundary used by the coordinator.
///
/// Implementations are synchronous and may be CPU heavy; callers are expected
/// to run them off the async executor.
pub trait ImageTransformer: Send + Sync {
    /// Confirms `input` is an image this transformer can decode.
    fn validate(&self, input: &[u8]) -> Result<(), TransformError>;

    /// Resizes `input` to the requested box and encodes it in the requested format.
    fn transform(&self, input: &[u8], options: &ResizeOptions) -> Result<Vec<u8>, TransformError>;
}

/// Transformer backed by the `image` crate, with lossy WebP through libwebp.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterTransformer;

impl ImageTransformer for RasterTransformer {
    fn validate(&self, input: &[u8]) -> Result<(), TransformError> {
        if input.is_empty() {
            return Err(TransformError::InvalidImage("image is empty".into()));
        }

        // Header-only probe: format detection plus dimensions, no pixel decode.
        let (w, h) = ImageReader::new(Cursor::new(input))
            .with_guessed_format()
            .map_err(|e| TransformError::InvalidImage(e.to_string()))?
            .into_dimensions()
            .map_err(|e| TransformError::InvalidImage(e.to_string()))?;

        if w == 0 || h == 0 {
            return Err(TransformError::InvalidImage("zero image dimensions".into()));
        }
        Ok(())
    }

    fn transform(&self, input: &[u8], options: &ResizeOptions) -> Result<Vec<u8>, TransformError> {
        if input.is_empty() {
            return Err(TransformError::InvalidImage("input image is empty".into()));
        }

        let format: OutputFormat = options
            .format
            .parse()
            .map_err(|_| TransformError::UnsupportedFormat(options.format.clone()))?;

        let img = decode_image(input)?;
        let resized = resize_image(&img, options.width, options.height);
        encode_image(&resized, format, options.quality)
    }
}

/// Decodes raw image bytes, detecting the format from magic bytes.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, TransformError> {
    let guessed = image::guess_format(bytes)
        .map_err(|e| TransformError::InvalidImage(e.to_string()))?;

    image::load_from_memory_with_format(bytes, guessed)
        .map_err(|e| TransformError::Processing(e.to_string()))
}

/// Resizes to exactly `width` x `height`.
///
/// The source is scaled to cover the target box and the overflow is cropped
/// around the centre, so the aspect ratio is never distorted. Lanczos3 keeps
/// aliasing low when downsampling.
pub fn resize_image(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_to_fill(
        width.max(1),
        height.max(1),
        image::imageops::FilterType::Lanczos3,
    )
}

/// Encodes image to specified format with quality control.
///
/// - **JPEG**: RGB, quality 1-100
/// - **PNG**: lossless, quality ignored
/// - **WebP**: RGBA lossy encoding via libwebp
pub fn encode_image(
    img: &DynamicImage,
    fmt: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    let mut out = Vec::new();
    let q = quality.clamp(1, 100);

    match fmt {
        OutputFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            let enc = JpegEncoder::new_with_quality(&mut out, q);
            enc.write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(|e| TransformError::Processing(e.to_string()))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
                .map_err(|e| TransformError::Processing(e.to_string()))?;
        }
        OutputFormat::Webp => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();

            let encoder = webp::Encoder::from_rgba(rgba.as_raw(), w, h);
            let encoded_webp = encoder.encode(f32::from(q));
            out.extend_from_slice(&encoded_webp);
        }
    }

    Ok(out)
}

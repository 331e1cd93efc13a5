use crate::config::{DEFAULT_FORMAT, DEFAULT_QUALITY, MAX_DIMENSION};
use crate::ResizeError;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// Supported output image formats
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => write!(f, "jpeg"),
            OutputFormat::Png => write!(f, "png"),
            OutputFormat::Webp => write!(f, "webp"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            _ => Err(format!("unsupported format: {}", s)),
        }
    }
}

/// Content type served for a requested format; unknown formats fall back to JPEG.
pub fn content_type_for(format: &str) -> &'static str {
    format
        .parse::<OutputFormat>()
        .map(OutputFormat::content_type)
        .unwrap_or("image/jpeg")
}

/// Resize parameters as they arrive in a query string or form, before any
/// defaulting or range checks.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ResizeParams {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default, deserialize_with = "blank_as_none")]
    pub width: Option<i64>,

    #[serde(default, deserialize_with = "blank_as_none")]
    pub height: Option<i64>,

    /// 1-100; absent or 0 means the default
    #[serde(default, deserialize_with = "blank_as_none")]
    pub quality: Option<i64>,

    #[serde(default)]
    pub format: Option<String>,
}

/// Numeric query values sent empty (`quality=`) count as unset.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid integer: {}", v))),
    }
}

impl FromStr for ResizeParams {
    type Err = serde_urlencoded::de::Error;

    /// Parse URL query string into ResizeParams structure
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_urlencoded::from_str(s)
    }
}

impl ResizeParams {
    /// Applies defaults and range checks, producing the options the
    /// coordinator and the cache key work with.
    pub fn into_options(self) -> Result<ResizeOptions, ResizeError> {
        let width = positive_dimension(self.width)
            .ok_or_else(|| ResizeError::Validation("Width and height must be positive integers".into()))?;
        let height = positive_dimension(self.height)
            .ok_or_else(|| ResizeError::Validation("Width and height must be positive integers".into()))?;
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ResizeError::Validation(format!(
                "Width and height must not exceed {}",
                MAX_DIMENSION
            )));
        }

        let quality = match self.quality.unwrap_or(0) {
            0 => DEFAULT_QUALITY,
            q @ 1..=100 => q as u8,
            _ => return Err(ResizeError::Validation("Quality must be between 1 and 100".into())),
        };

        let format = match self.format {
            Some(f) if !f.is_empty() => f,
            _ => DEFAULT_FORMAT.to_string(),
        };

        Ok(ResizeOptions { width, height, quality, format })
    }
}

fn positive_dimension(value: Option<i64>) -> Option<u32> {
    value.filter(|v| *v > 0).and_then(|v| u32::try_from(v).ok())
}

/// Normalized transform options.
///
/// `format` is kept as requested (after defaulting) so that the cache key and
/// the response content type see exactly what the client asked for; the
/// transformer decides whether it can produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeOptions {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub format: String,
}

impl ResizeOptions {
    /// Re-applies defaults and checks to options built by hand.
    pub fn normalized(self) -> Result<Self, ResizeError> {
        ResizeParams {
            url: None,
            width: Some(i64::from(self.width)),
            height: Some(i64::from(self.height)),
            quality: Some(i64::from(self.quality)),
            format: Some(self.format),
        }
        .into_options()
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.format)
    }
}

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_QUALITY: u8 = 80;
pub const DEFAULT_FORMAT: &str = "jpeg";
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=3600";

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_DOWNLOAD_SIZE: usize = 50 * 1024 * 1024;
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Largest accepted output width or height, in pixels.
pub const MAX_DIMENSION: u32 = 10_000;

/// What the fetcher does when a remote body is larger than the download cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Stop reading at the cap and keep what was read.
    #[default]
    Truncate,
    /// Fail the fetch.
    Reject,
}

impl FromStr for OversizePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "truncate" => Ok(OversizePolicy::Truncate),
            "reject" => Ok(OversizePolicy::Reject),
            other => Err(ConfigError::InvalidOversizePolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResizerConfig {
    pub port: u16,
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
    pub fetch_timeout: Duration,
    pub max_download_size: usize, // bytes
    pub max_upload_size: usize,   // bytes, declared
    pub oversize_policy: OversizePolicy,
}

impl Default for ResizerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cache_ttl: DEFAULT_CACHE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_download_size: DEFAULT_MAX_DOWNLOAD_SIZE,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            oversize_policy: OversizePolicy::Truncate,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cache TTL must be > 0")] ZeroTtl,
    #[error("Sweep interval must be > 0")] ZeroSweepInterval,
    #[error("Fetch timeout must be > 0")] ZeroFetchTimeout,
    #[error("Max download size must be > 0")] InvalidMaxDownload,
    #[error("Max upload size must be > 0")] InvalidMaxUpload,
    #[error("Invalid value for {name}: {value}")] InvalidNumber { name: &'static str, value: String },
    #[error("Unknown oversize policy: {0} (expected truncate or reject)")] InvalidOversizePolicy(String),
}

impl ResizerConfig {
    /// Loads configuration from the environment, falling back to defaults for
    /// unset variables.
    ///
    /// # Environment Variables
    /// - `PORT` - HTTP listen port (default: 8080)
    /// - `RESIZER_CACHE_TTL_SECS` - lifetime of a cached result (default: 3600)
    /// - `RESIZER_SWEEP_INTERVAL_SECS` - expiry sweep period (default: 300)
    /// - `RESIZER_FETCH_TIMEOUT_SECS` - remote fetch timeout (default: 30)
    /// - `RESIZER_MAX_DOWNLOAD_BYTES` - remote body cap (default: 50 MiB)
    /// - `RESIZER_MAX_UPLOAD_BYTES` - declared upload ceiling (default: 10 MiB)
    /// - `RESIZER_OVERSIZE_POLICY` - `truncate` or `reject` (default: truncate)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |name: &'static str, fallback: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_var::<u64>(&lookup, name)?.map(Duration::from_secs).unwrap_or(fallback))
        };

        Ok(Self {
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
            cache_ttl: secs("RESIZER_CACHE_TTL_SECS", defaults.cache_ttl)?,
            sweep_interval: secs("RESIZER_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            fetch_timeout: secs("RESIZER_FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            max_download_size: parse_var(&lookup, "RESIZER_MAX_DOWNLOAD_BYTES")?
                .unwrap_or(defaults.max_download_size),
            max_upload_size: parse_var(&lookup, "RESIZER_MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_size),
            oversize_policy: match lookup("RESIZER_OVERSIZE_POLICY") {
                Some(v) => v.parse()?,
                None => defaults.oversize_policy,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl.is_zero() { return Err(ConfigError::ZeroTtl); }
        if self.sweep_interval.is_zero() { return Err(ConfigError::ZeroSweepInterval); }
        if self.fetch_timeout.is_zero() { return Err(ConfigError::ZeroFetchTimeout); }
        if self.max_download_size == 0 { return Err(ConfigError::InvalidMaxDownload); }
        if self.max_upload_size == 0 { return Err(ConfigError::InvalidMaxUpload); }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

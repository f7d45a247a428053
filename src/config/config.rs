//! # Pipeline Configuration
//!
//! Configuration shared by the `snap` CLI and any embedding application.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Env var | Default | Description |
//! |-----------|---------|---------|-------------|
//! | `api_base_url` | `SNAP_API_URL` | `http://localhost:8000` | Backend base URL |
//! | `screen_width` | `SNAP_SCREEN_WIDTH` | `390` | Logical width the preview fills |
//! | `frame_size` | `SNAP_FRAME_SIZE` | `280` | Side of the on-screen guide frame |
//! | `jpeg_quality` | `SNAP_JPEG_QUALITY` | `80` | Upload JPEG quality (1-100) |
//! | `session_file` | `SNAP_SESSION_FILE` | `.snap-session.json` | Persisted identity |
//! | `request_timeout` | `SNAP_REQUEST_TIMEOUT_SECS` | unset | Per-request deadline |
//!
//! Leaving `request_timeout` unset keeps the HTTP transport's default
//! behavior, which has no overall deadline.
//!
//! ## Examples
//!
//! ```rust
//! use food_snap::config::SnapConfig;
//!
//! let mut config = SnapConfig::default();
//! assert!(config.validate().is_ok());
//!
//! config.screen_width = 0.0;
//! assert!(config.validate().is_err());
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use snap_crop::cpu::DEFAULT_JPEG_QUALITY;
use snap_crop::geometry::GuideFrame;

use crate::error::{PipelineError, PipelineResult};

pub const ENV_API_URL: &str = "SNAP_API_URL";
pub const ENV_SCREEN_WIDTH: &str = "SNAP_SCREEN_WIDTH";
pub const ENV_FRAME_SIZE: &str = "SNAP_FRAME_SIZE";
pub const ENV_JPEG_QUALITY: &str = "SNAP_JPEG_QUALITY";
pub const ENV_SESSION_FILE: &str = "SNAP_SESSION_FILE";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SNAP_REQUEST_TIMEOUT_SECS";

/// Configuration for one pipeline instance.
#[derive(Debug, Clone)]
pub struct SnapConfig {
    /// Base URL of the prediction and ledger backend.
    pub api_base_url: String,

    /// Logical width of the screen the camera preview fills.
    ///
    /// Together with `frame_size` this fixes the points-to-pixels scale used
    /// to find the guide frame inside the photo. Must be positive.
    pub screen_width: f64,

    /// Side of the square guide frame in logical points. Must be positive.
    pub frame_size: f64,

    /// JPEG quality for the cropped upload, 1-100.
    pub jpeg_quality: u8,

    /// Where the session store keeps the signed-in identity.
    pub session_file: PathBuf,

    /// Optional per-request deadline. `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            screen_width: 390.0,
            frame_size: GuideFrame::DEFAULT_SIDE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            session_file: PathBuf::from(".snap-session.json"),
            request_timeout: None,
        }
    }
}

impl SnapConfig {
    /// Load configuration from `SNAP_*` environment variables over the defaults.
    ///
    /// Unset variables keep their default; set-but-unparsable variables are
    /// an error rather than being silently ignored.
    pub fn from_env() -> PipelineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SnapConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PipelineResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_SCREEN_WIDTH) {
            config.screen_width = parse_var(ENV_SCREEN_WIDTH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_FRAME_SIZE) {
            config.frame_size = parse_var(ENV_FRAME_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_JPEG_QUALITY) {
            config.jpeg_quality = parse_var(ENV_JPEG_QUALITY, &raw)?;
        }
        if let Some(path) = lookup(ENV_SESSION_FILE) {
            config.session_file = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = parse_var(ENV_REQUEST_TIMEOUT_SECS, &raw)?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> PipelineResult<()> {
        self.base_url()?;
        if !self.screen_width.is_finite() || self.screen_width <= 0.0 {
            return Err(PipelineError::config(
                "screen_width",
                format!("must be a positive number, got {}", self.screen_width),
            ));
        }
        if !self.frame_size.is_finite() || self.frame_size <= 0.0 {
            return Err(PipelineError::config(
                "frame_size",
                format!("must be a positive number, got {}", self.frame_size),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PipelineError::config(
                "jpeg_quality",
                format!("must be between 1 and 100, got {}", self.jpeg_quality),
            ));
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err(PipelineError::config("request_timeout", "must be greater than 0"));
        }
        Ok(())
    }

    /// Parsed backend URL.
    pub fn base_url(&self) -> PipelineResult<Url> {
        let url = Url::parse(&self.api_base_url)
            .map_err(|e| PipelineError::config("api_base_url", format!("{e}: {}", self.api_base_url)))?;
        if url.cannot_be_a_base() {
            return Err(PipelineError::config(
                "api_base_url",
                format!("not usable as a base URL: {}", self.api_base_url),
            ));
        }
        Ok(url)
    }

    /// The guide frame this configuration describes.
    pub fn guide_frame(&self) -> GuideFrame {
        GuideFrame::new(self.screen_width, self.frame_size)
    }

    /// Build the shared HTTP client.
    pub fn http_client(&self) -> PipelineResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("food_snap/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| PipelineError::config("http_client", e.to_string()))
    }
}

fn parse_var<T>(key: &str, raw: &str) -> PipelineResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| PipelineError::config(key, format!("{e} (value: {raw})")))
}

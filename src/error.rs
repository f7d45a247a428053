//! # Pipeline Error Handling
//!
//! Error taxonomy for the capture-to-ledger pipeline.
//!
//! ## Architecture
//!
//! Every failure the pipeline can hit maps to one [`PipelineError`] variant:
//!
//! - **Identity**: no signed-in user; raised before any network call
//! - **Capture**: the camera could not produce a photo
//! - **Crop**: degenerate geometry or an image that could not be cut/encoded
//! - **Upload**: `/predict` failed, returned non-2xx or a malformed body
//! - **Fetch / Update**: the ledger GET or PUT failed
//! - **Validation**: a caller-supplied value was rejected locally
//! - **Config / Storage**: configuration and session-store problems
//!
//! Nothing here is fatal to the process. Errors are shown to the user as a
//! [`Notice`]; retrying means a new user action, the pipeline never retries
//! on its own.
//!
//! ## Usage
//!
//! ```rust
//! use food_snap::error::{PipelineError, classify};
//!
//! let error = PipelineError::upload(Some(500), "prediction service returned 500");
//! assert_eq!(error.category(), "upload");
//! assert!(classify::is_network(&error));
//! assert_eq!(error.notice().message, "Analysis failed. Check your connection.");
//! ```

use std::fmt;

use snap_crop::CropError;

/// Base error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No usable identity in the session store.
    #[error("identity error: {reason}")]
    Identity { reason: String },

    /// Camera hardware or photo source failure.
    #[error("capture failed: {reason}")]
    Capture { reason: String },

    /// Crop geometry or pixel cut failure.
    #[error("crop failed: {reason}")]
    Crop { reason: String },

    /// `/predict` round trip failure.
    #[error("upload failed{}: {reason}", status_suffix(.status))]
    Upload { status: Option<u16>, reason: String },

    /// Ledger GET failure.
    #[error("fetching today's activity failed{}: {reason}", status_suffix(.status))]
    Fetch { status: Option<u16>, reason: String },

    /// Ledger PUT failure.
    #[error("updating today's activity failed{}: {reason}", status_suffix(.status))]
    Update { status: Option<u16>, reason: String },

    /// Locally rejected input.
    #[error("validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Invalid configuration.
    #[error("configuration error in '{field}': {reason}")]
    Config { field: String, reason: String },

    /// Session store I/O or encoding failure.
    #[error("session store error during {operation}: {reason}")]
    Storage { operation: String, reason: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl PipelineError {
    pub fn identity(reason: impl Into<String>) -> Self {
        Self::Identity {
            reason: reason.into(),
        }
    }

    pub fn capture(reason: impl Into<String>) -> Self {
        Self::Capture {
            reason: reason.into(),
        }
    }

    pub fn crop(reason: impl Into<String>) -> Self {
        Self::Crop {
            reason: reason.into(),
        }
    }

    pub fn upload(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Upload {
            status,
            reason: reason.into(),
        }
    }

    pub fn fetch(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            status,
            reason: reason.into(),
        }
    }

    pub fn update(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Update {
            status,
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Identity { .. } => "identity",
            Self::Capture { .. } => "capture",
            Self::Crop { .. } => "crop",
            Self::Upload { .. } => "upload",
            Self::Fetch { .. } => "fetch",
            Self::Update { .. } => "update",
            Self::Validation { .. } => "validation",
            Self::Config { .. } => "config",
            Self::Storage { .. } => "storage",
        }
    }

    /// HTTP status that caused the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upload { status, .. } | Self::Fetch { status, .. } | Self::Update { status, .. } => {
                *status
            }
            _ => None,
        }
    }

    /// The message shown to the user for this error.
    pub fn notice(&self) -> Notice {
        let message = match self {
            Self::Identity { .. } => "User not logged in".to_string(),
            Self::Capture { .. } => "Could not take a photo. Try again.".to_string(),
            Self::Crop { .. } => "Could not prepare the photo. Try again.".to_string(),
            Self::Upload { .. } => "Analysis failed. Check your connection.".to_string(),
            Self::Fetch { .. } | Self::Update { .. } => "Could not save to daily intake.".to_string(),
            Self::Validation { field, reason } => format!("Invalid {field}: {reason}"),
            Self::Config { field, reason } => format!("Invalid setting {field}: {reason}"),
            Self::Storage { .. } => "Could not read the saved session.".to_string(),
        };
        Notice {
            category: self.category(),
            message,
        }
    }
}

/// Result type alias using the pipeline error
pub type PipelineResult<T> = Result<T, PipelineError>;

/// User-visible rendering of an error. Cheap to clone into UI state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub category: &'static str,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Errors raised by a network round trip (including non-2xx answers).
    pub fn is_network(error: &PipelineError) -> bool {
        matches!(
            error,
            PipelineError::Upload { .. } | PipelineError::Fetch { .. } | PipelineError::Update { .. }
        )
    }

    /// Errors that only go away once the external auth flow signs someone in.
    pub fn requires_sign_in(error: &PipelineError) -> bool {
        matches!(error, PipelineError::Identity { .. })
    }
}

impl From<CropError> for PipelineError {
    fn from(error: CropError) -> Self {
        Self::crop(error.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        Self::storage("io", error.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        Self::storage("decode", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PipelineError::identity("no user id stored");
        assert_eq!(error.category(), "identity");
        assert!(classify::requires_sign_in(&error));
        assert!(!classify::is_network(&error));
    }

    #[test]
    fn test_status_in_display() {
        let error = PipelineError::update(Some(503), "service unavailable");
        assert_eq!(error.status(), Some(503));
        assert_eq!(
            error.to_string(),
            "updating today's activity failed (HTTP 503): service unavailable"
        );

        let error = PipelineError::fetch(None, "connection refused");
        assert_eq!(error.to_string(), "fetching today's activity failed: connection refused");
    }

    #[test]
    fn test_crop_error_conversion() {
        let error: PipelineError = CropError::ScreenWidth(0.0).into();
        assert_eq!(error.category(), "crop");
        assert_eq!(error.notice().category, "crop");
    }

    #[test]
    fn test_ledger_errors_share_notice() {
        let fetch = PipelineError::fetch(Some(500), "boom").notice();
        let update = PipelineError::update(Some(500), "boom").notice();
        assert_eq!(fetch.message, update.message);
        assert_ne!(fetch.category, update.category);
    }
}

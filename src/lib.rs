//! # Food Snap
//!
//! Capture-to-ledger pipeline for food photos: take a photo, cut out the
//! on-screen guide square, have the backend classify it, and optionally add
//! its calories and protein to the signed-in user's totals for today.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `capture`: camera and crop/encode capabilities
//! - `session`: the shutter-to-display state machine
//! - `client`: `/predict` and daily ledger HTTP clients
//! - `identity`: persisted signed-in identity
//! - `config`: configuration loading and validation
//! - `error`: the pipeline error taxonomy
//!
//! Pure crop geometry and the pixel cut live in the `snap-crop` crate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use food_snap::client::{LedgerAggregator, MacroDelta};
//! use food_snap::config::SnapConfig;
//! use food_snap::identity::SessionStore;
//!
//! # async fn example() -> food_snap::error::PipelineResult<()> {
//! let config = SnapConfig::from_env()?;
//! let store = SessionStore::at_path(&config.session_file);
//! let ledger = LedgerAggregator::from_config(&config)?;
//!
//! let identity = store.get_identity().await?;
//! let totals = ledger
//!     .add_to_daily_ledger(identity.as_ref(), MacroDelta::new(266.0, 11.0))
//!     .await?;
//! println!("{} kcal today", totals.calories_consumed);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;

/// Re-export error types for convenience
pub use error::{Notice, PipelineError, PipelineResult};

pub use capture::{Camera, CroppedImage, FileCamera, ImageCropper, JpegCropper, Photo};
pub use client::{
    DailyActivity, HttpLedger, LedgerAggregator, LedgerBackend, MacroDelta, Nutrition,
    PredictionClient, PredictionResult, Predictor,
};
pub use config::SnapConfig;
pub use identity::{SessionIdentity, SessionStore};
pub use session::{CaptureSession, CaptureState, Displayed, Phase, ShutterOutcome};

/// Re-export the geometry types callers need to configure a session
pub use snap_crop::geometry::{CropRegion, GuideFrame, PixelRect, Size};

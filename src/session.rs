//! # Capture Session
//!
//! Drives one shutter press through capture, crop and prediction, and
//! publishes every state transition to subscribers.
//!
//! ## State Machine
//!
//! ```text
//! Idle --shutter--> Capturing --photo--> Cropping --cropped--> Uploading
//!   ^                   |                   |                      |
//!   |                   +---------+---------+----------+-----------+
//!   |                             v                    v
//!   +------dismiss------- Displaying(Error)   Displaying(Result)
//! ```
//!
//! - A shutter press outside `Idle` is ignored
//! - `dismiss` is accepted in `Uploading` and `Displaying`, a no-op elsewhere
//! - Dismissing during `Uploading` cancels the cycle: its prediction is
//!   dropped and never reaches the state
//! - Dropping a `shutter` future before it finishes (timeout, `select!`,
//!   aborted task) abandons its cycle and puts the session back to `Idle`
//!
//! ## Concurrency
//!
//! The current cycle id and its cancellation token sit behind a short mutex
//! that is never held across an await. Every transition re-checks the cycle
//! id under that mutex, so a stale cycle can never overwrite the state of a
//! newer one.
//!
//! A cancelled prediction is only dropped once its task runs again, so each
//! upload also holds an async upload slot. A new cycle that follows a
//! dismiss waits for the abandoned call to be gone before it sends its own;
//! at most one prediction is ever in flight.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use food_snap::capture::{FileCamera, JpegCropper};
//! use food_snap::client::PredictionClient;
//! use food_snap::config::SnapConfig;
//! use food_snap::session::CaptureSession;
//!
//! # async fn run() -> food_snap::error::PipelineResult<()> {
//! let config = SnapConfig::default();
//! let session = CaptureSession::builder()
//!     .with_camera(Arc::new(FileCamera::new("plate.jpg")))
//!     .with_cropper(Arc::new(JpegCropper::new(config.jpeg_quality)))
//!     .with_predictor(Arc::new(PredictionClient::from_config(&config)?))
//!     .with_guide_frame(config.guide_frame())
//!     .build()?;
//!
//! let outcome = session.shutter().await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use snap_crop::geometry::{GuideFrame, compute_crop};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{Camera, CroppedImage, ImageCropper, Photo};
use crate::client::predict::{PredictionResult, Predictor};
use crate::error::{Notice, PipelineError, PipelineResult};

/// Observable session state.
#[derive(Debug, Clone, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Capturing,
    Cropping { photo: Photo },
    Uploading { image: CroppedImage },
    Displaying(Displayed),
}

/// What the user is looking at after a cycle finishes.
#[derive(Debug, Clone)]
pub enum Displayed {
    Result {
        image: CroppedImage,
        prediction: PredictionResult,
    },
    Error(Notice),
}

/// Fieldless view of [`CaptureState`], handy for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Capturing,
    Cropping,
    Uploading,
    DisplayingResult,
    DisplayingError,
}

impl CaptureState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Capturing => Phase::Capturing,
            Self::Cropping { .. } => Phase::Cropping,
            Self::Uploading { .. } => Phase::Uploading,
            Self::Displaying(Displayed::Result { .. }) => Phase::DisplayingResult,
            Self::Displaying(Displayed::Error(_)) => Phase::DisplayingError,
        }
    }

    /// The prediction on screen, if any.
    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            Self::Displaying(Displayed::Result { prediction, .. }) => Some(prediction),
            _ => None,
        }
    }
}

/// How a shutter press ended.
#[derive(Debug, Clone)]
pub enum ShutterOutcome {
    /// Another cycle was already in flight.
    Ignored,
    /// The cycle reached `Displaying`.
    Displayed(Displayed),
    /// The cycle was dismissed before it finished.
    Discarded,
}

struct Cycle {
    id: u64,
    cancel: CancellationToken,
}

/// Returns the session to `Idle` if the owning `shutter` future is dropped
/// while its cycle is still in flight.
struct AbandonGuard<'a> {
    session: &'a CaptureSession,
    id: u64,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        self.session.abandon(self.id);
    }
}

/// Single-cycle capture orchestrator.
pub struct CaptureSession {
    camera: Arc<dyn Camera>,
    cropper: Arc<dyn ImageCropper>,
    predictor: Arc<dyn Predictor>,
    frame: GuideFrame,
    cycle: Mutex<Cycle>,
    upload_slot: tokio::sync::Mutex<()>,
    state: watch::Sender<CaptureState>,
}

impl CaptureSession {
    pub fn builder() -> CaptureSessionBuilder {
        CaptureSessionBuilder::new()
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> CaptureState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase()
    }

    pub fn guide_frame(&self) -> GuideFrame {
        self.frame
    }

    /// Run one capture cycle to completion.
    ///
    /// Returns [`ShutterOutcome::Ignored`] immediately when a cycle is
    /// already in flight.
    pub async fn shutter(&self) -> ShutterOutcome {
        let Some((id, cancel)) = self.begin_cycle() else {
            debug!(phase = ?self.phase(), "shutter ignored");
            return ShutterOutcome::Ignored;
        };
        let _abandon = AbandonGuard { session: self, id };
        debug!(cycle = id, "capturing");

        let photo = match guarded(&cancel, self.camera.take_picture()).await {
            None => return ShutterOutcome::Discarded,
            Some(Err(e)) => return self.fail(id, e),
            Some(Ok(photo)) => photo,
        };

        if !self.advance(id, CaptureState::Cropping { photo: photo.clone() }) {
            return ShutterOutcome::Discarded;
        }
        let region = match compute_crop(self.frame, photo.size()) {
            Ok(region) if region.is_within(photo.size()) => region,
            Ok(region) => {
                let clamped = region.clamp_to(photo.size());
                debug!(cycle = id, ?region, ?clamped, "crop region clamped into photo");
                clamped
            }
            Err(e) => return self.fail(id, e.into()),
        };
        let image = match guarded(&cancel, self.cropper.crop(&photo, region)).await {
            None => return ShutterOutcome::Discarded,
            Some(Err(e)) => return self.fail(id, e),
            Some(Ok(image)) => image,
        };

        if !self.advance(id, CaptureState::Uploading { image: image.clone() }) {
            return ShutterOutcome::Discarded;
        }
        let Some(_upload) = guarded(&cancel, self.upload_slot.lock()).await else {
            return ShutterOutcome::Discarded;
        };
        debug!(cycle = id, bytes = image.byte_len(), "uploading");
        let prediction = match guarded(&cancel, self.predictor.predict(image.uri())).await {
            None => {
                debug!(cycle = id, "prediction dropped after dismiss");
                return ShutterOutcome::Discarded;
            }
            Some(Err(e)) => return self.fail(id, e),
            Some(Ok(prediction)) => prediction,
        };

        info!(
            cycle = id,
            food = %prediction.food_label,
            confidence = prediction.confidence_percent,
            "prediction displayed"
        );
        self.finish(id, Displayed::Result { image, prediction })
    }

    /// Return to `Idle` from `Uploading` or `Displaying`.
    ///
    /// Returns whether anything was dismissed.
    pub fn dismiss(&self) -> bool {
        let cycle = self.lock_cycle();
        let dismissible = matches!(
            *self.state.borrow(),
            CaptureState::Uploading { .. } | CaptureState::Displaying(_)
        );
        if !dismissible {
            return false;
        }
        cycle.cancel.cancel();
        self.state.send_replace(CaptureState::Idle);
        debug!(cycle = cycle.id, "dismissed");
        true
    }

    /// Cancel cycle `id` and go back to `Idle` unless it already reached
    /// `Displaying` or was superseded.
    fn abandon(&self, id: u64) {
        let cycle = self.lock_cycle();
        let in_flight = matches!(
            *self.state.borrow(),
            CaptureState::Capturing | CaptureState::Cropping { .. } | CaptureState::Uploading { .. }
        );
        if cycle.id != id || !in_flight {
            return;
        }
        cycle.cancel.cancel();
        self.state.send_replace(CaptureState::Idle);
        debug!(cycle = id, "cycle abandoned before completion");
    }

    fn lock_cycle(&self) -> MutexGuard<'_, Cycle> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_cycle(&self) -> Option<(u64, CancellationToken)> {
        let mut cycle = self.lock_cycle();
        if !matches!(*self.state.borrow(), CaptureState::Idle) {
            return None;
        }
        cycle.id += 1;
        cycle.cancel = CancellationToken::new();
        self.state.send_replace(CaptureState::Capturing);
        Some((cycle.id, cycle.cancel.clone()))
    }

    /// Publish `next` if cycle `id` is still the live one.
    fn advance(&self, id: u64, next: CaptureState) -> bool {
        let cycle = self.lock_cycle();
        if cycle.id != id || cycle.cancel.is_cancelled() {
            return false;
        }
        self.state.send_replace(next);
        true
    }

    fn finish(&self, id: u64, displayed: Displayed) -> ShutterOutcome {
        if self.advance(id, CaptureState::Displaying(displayed.clone())) {
            ShutterOutcome::Displayed(displayed)
        } else {
            ShutterOutcome::Discarded
        }
    }

    fn fail(&self, id: u64, error: PipelineError) -> ShutterOutcome {
        warn!(cycle = id, category = error.category(), error = %error, "capture cycle failed");
        self.finish(id, Displayed::Error(error.notice()))
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("frame", &self.frame)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Run `fut` unless `cancel` fires first.
async fn guarded<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        value = fut => Some(value),
    }
}

/// Builder for [`CaptureSession`].
pub struct CaptureSessionBuilder {
    camera: Option<Arc<dyn Camera>>,
    cropper: Option<Arc<dyn ImageCropper>>,
    predictor: Option<Arc<dyn Predictor>>,
    frame: GuideFrame,
}

impl Default for CaptureSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSessionBuilder {
    pub fn new() -> Self {
        Self {
            camera: None,
            cropper: None,
            predictor: None,
            frame: GuideFrame::new(390.0, GuideFrame::DEFAULT_SIDE),
        }
    }

    pub fn with_camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_cropper(mut self, cropper: Arc<dyn ImageCropper>) -> Self {
        self.cropper = Some(cropper);
        self
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn with_guide_frame(mut self, frame: GuideFrame) -> Self {
        self.frame = frame;
        self
    }

    /// # Errors
    /// [`PipelineError::Config`] when a capability is missing.
    pub fn build(self) -> PipelineResult<CaptureSession> {
        let camera = self
            .camera
            .ok_or_else(|| PipelineError::config("camera", "no camera configured"))?;
        let cropper = self
            .cropper
            .ok_or_else(|| PipelineError::config("cropper", "no cropper configured"))?;
        let predictor = self
            .predictor
            .ok_or_else(|| PipelineError::config("predictor", "no predictor configured"))?;

        Ok(CaptureSession {
            camera,
            cropper,
            predictor,
            frame: self.frame,
            cycle: Mutex::new(Cycle {
                id: 0,
                cancel: CancellationToken::new(),
            }),
            upload_slot: tokio::sync::Mutex::new(()),
            state: watch::Sender::new(CaptureState::Idle),
        })
    }
}

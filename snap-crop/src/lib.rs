// SPDX-License-Identifier: MIT
//! # snap-crop: Guide-Frame Cropping for Food Photos
//!
//! This crate maps a fixed on-screen guide frame (the square the user aims the
//! food into) onto the full-resolution photo the camera returns, then cuts and
//! re-encodes that square as a JPEG ready for upload.
//!
//! ## Key Components
//!
//! - [`geometry`]: Pure crop-region computation, bounds checks and clamping
//! - [`cpu`]: Decode → crop → JPEG encode on the CPU via the `image` crate
//!
//! ## Coordinate Model
//!
//! The preview is assumed to fill the screen width and share the photo's
//! aspect ratio, so a single horizontal scale factor converts logical points
//! to photo pixels:
//!
//! - `scale = photo_width / screen_width`
//! - `crop_side = frame_side * scale`
//! - origin centers the square on the photo center
//!
//! When preview and photo aspect ratios differ the square comes out
//! off-center; nothing here corrects for that.
//!
//! ## Usage Example
//!
//! ```rust
//! use snap_crop::geometry::{compute_crop, GuideFrame, Size};
//!
//! let photo = Size { w: 3024, h: 4032 };
//! let region = compute_crop(GuideFrame::new(390.0, 280.0), photo).unwrap();
//! assert!(region.is_within(photo));
//! let rect = region.to_pixel_rect(photo).unwrap();
//! assert_eq!(rect.width, rect.height);
//! ```

pub mod cpu;
pub mod geometry;

/// Errors raised while computing or applying a crop.
#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("screen width must be a positive finite number, got {0}")]
    ScreenWidth(f64),
    #[error("guide frame side must be a positive finite number, got {0}")]
    FrameSide(f64),
    #[error("photo has a zero dimension ({w}x{h})")]
    EmptyPhoto { w: u32, h: u32 },
    #[error("crop region is degenerate: {0}")]
    Degenerate(String),
    #[error("crop rectangle at ({x}, {y}) sized {width}x{height} exceeds image {image_w}x{image_h}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_w: u32,
        image_h: u32,
    },
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

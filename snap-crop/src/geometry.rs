// SPDX-License-Identifier: MIT
//! # Crop Geometry
//!
//! Computes which square of a full-resolution photo sits under the on-screen
//! guide frame.
//!
//! ## Design Philosophy
//!
//! The module keeps three concepts apart:
//! 1. **GuideFrame**: the logical-point square drawn over the preview
//! 2. **CropRegion**: that square expressed in photo pixels (floating point)
//! 3. **PixelRect**: the integer rectangle actually cut out of the photo
//!
//! [`compute_crop`] is the unclamped mapping. It can request a square larger
//! than the photo when the frame is wide relative to the screen or the photo is
//! landscape; [`CropRegion::clamp_to`] is the hardened variant that pulls the
//! square back inside the photo, keeping its center where possible.

use crate::CropError;

/// Photo dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

/// The square guide frame drawn over the camera preview, in logical points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GuideFrame {
    /// Width of the screen the preview fills.
    pub screen_width: f64,
    /// Side of the square guide frame.
    pub side: f64,
}

impl GuideFrame {
    /// Side of the guide frame used by the capture screen.
    pub const DEFAULT_SIDE: f64 = 280.0;

    pub fn new(screen_width: f64, side: f64) -> Self {
        Self { screen_width, side }
    }

    /// Points-to-pixels factor for a photo taken with this preview.
    pub fn scale_for(&self, photo: Size) -> Result<f64, CropError> {
        if !self.screen_width.is_finite() || self.screen_width <= 0.0 {
            return Err(CropError::ScreenWidth(self.screen_width));
        }
        if photo.w == 0 || photo.h == 0 {
            return Err(CropError::EmptyPhoto {
                w: photo.w,
                h: photo.h,
            });
        }
        Ok(f64::from(photo.w) / self.screen_width)
    }
}

/// Square crop in photo-pixel coordinates. Derived per capture, never stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRegion {
    pub origin_x: f64,
    pub origin_y: f64,
    pub size: f64,
}

/// Integer rectangle cut out of the photo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Map the guide frame onto a photo.
///
/// `scale = photo.w / screen_width`, `size = side * scale`, and the origin
/// centers the square on the photo. The result is not clamped.
///
/// # Errors
/// - [`CropError::ScreenWidth`] when the screen width is zero, negative or not finite
/// - [`CropError::FrameSide`] when the frame side is zero, negative or not finite
/// - [`CropError::EmptyPhoto`] when either photo dimension is zero
pub fn compute_crop(frame: GuideFrame, photo: Size) -> Result<CropRegion, CropError> {
    if !frame.side.is_finite() || frame.side <= 0.0 {
        return Err(CropError::FrameSide(frame.side));
    }
    let scale = frame.scale_for(photo)?;
    let size = frame.side * scale;

    Ok(CropRegion {
        origin_x: f64::from(photo.w) / 2.0 - size / 2.0,
        origin_y: f64::from(photo.h) / 2.0 - size / 2.0,
        size,
    })
}

impl CropRegion {
    /// True when the square lies inside `[0, w] x [0, h]`.
    pub fn is_within(&self, photo: Size) -> bool {
        self.origin_x >= 0.0
            && self.origin_y >= 0.0
            && self.origin_x + self.size <= f64::from(photo.w)
            && self.origin_y + self.size <= f64::from(photo.h)
    }

    /// Pull the square inside the photo.
    ///
    /// The side shrinks to at most the photo's shorter dimension and the
    /// square keeps its center unless that would push it past an edge, in
    /// which case it slides inward. A region that is already inside comes
    /// back unchanged.
    pub fn clamp_to(self, photo: Size) -> CropRegion {
        if self.is_within(photo) {
            return self;
        }

        let (w, h) = (f64::from(photo.w), f64::from(photo.h));
        let size = self.size.min(w).min(h).max(0.0);
        let center_x = self.origin_x + self.size / 2.0;
        let center_y = self.origin_y + self.size / 2.0;

        CropRegion {
            origin_x: (center_x - size / 2.0).clamp(0.0, w - size),
            origin_y: (center_y - size / 2.0).clamp(0.0, h - size),
            size,
        }
    }

    /// Round to the integer rectangle that gets cut.
    ///
    /// The origin is floored and the side rounded; the rectangle is then
    /// trimmed to the photo so it never reads past an edge.
    pub fn to_pixel_rect(&self, photo: Size) -> Result<PixelRect, CropError> {
        if !(self.origin_x.is_finite() && self.origin_y.is_finite() && self.size.is_finite()) {
            return Err(CropError::Degenerate(format!("non-finite region {self:?}")));
        }
        if self.size < 1.0 {
            return Err(CropError::Degenerate(format!(
                "side {:.3}px is smaller than one pixel",
                self.size
            )));
        }

        let x = (self.origin_x.max(0.0).floor() as u32).min(photo.w);
        let y = (self.origin_y.max(0.0).floor() as u32).min(photo.h);
        let side = self.size.round() as u32;
        let width = side.min(photo.w - x);
        let height = side.min(photo.h - y);

        if width == 0 || height == 0 {
            return Err(CropError::Degenerate(format!(
                "region {self:?} does not overlap a {}x{} photo",
                photo.w, photo.h
            )));
        }

        Ok(PixelRect {
            x,
            y,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTRAIT: Size = Size { w: 3024, h: 4032 };

    #[test]
    fn test_centered_square_on_portrait_photo() {
        let region = compute_crop(GuideFrame::new(390.0, 280.0), PORTRAIT).unwrap();
        let scale = 3024.0 / 390.0;
        assert!((region.size - 280.0 * scale).abs() < 1e-9);
        assert!((region.origin_x - (1512.0 - region.size / 2.0)).abs() < 1e-9);
        assert!((region.origin_y - (2016.0 - region.size / 2.0)).abs() < 1e-9);
        assert!(region.is_within(PORTRAIT));
    }

    #[test]
    fn test_zero_screen_width_is_rejected() {
        let err = compute_crop(GuideFrame::new(0.0, 280.0), PORTRAIT).unwrap_err();
        assert!(matches!(err, CropError::ScreenWidth(w) if w == 0.0));

        let err = compute_crop(GuideFrame::new(f64::NAN, 280.0), PORTRAIT).unwrap_err();
        assert!(matches!(err, CropError::ScreenWidth(_)));
    }

    #[test]
    fn test_degenerate_frame_and_photo_are_rejected() {
        assert!(matches!(
            compute_crop(GuideFrame::new(390.0, 0.0), PORTRAIT),
            Err(CropError::FrameSide(_))
        ));
        assert!(matches!(
            compute_crop(GuideFrame::new(390.0, 280.0), Size { w: 0, h: 100 }),
            Err(CropError::EmptyPhoto { w: 0, h: 100 })
        ));
    }

    #[test]
    fn test_region_within_bounds_whenever_it_fits() {
        for screen_width in [320.0, 360.0, 390.0, 414.0, 768.0] {
            for (w, h) in [(3024, 4032), (1080, 1920), (4000, 4000), (720, 1280)] {
                let photo = Size { w, h };
                let frame = GuideFrame::new(screen_width, GuideFrame::DEFAULT_SIDE);
                let region = compute_crop(frame, photo).unwrap();
                if region.size <= f64::from(w) && region.size <= f64::from(h) {
                    assert!(region.is_within(photo), "{region:?} outside {photo:?}");
                }
            }
        }
    }

    #[test]
    fn test_landscape_photo_overflows_until_clamped() {
        // Frame nearly as wide as the screen on a wide photo: the square is
        // taller than the photo.
        let photo = Size { w: 4000, h: 1000 };
        let region = compute_crop(GuideFrame::new(390.0, 280.0), photo).unwrap();
        assert!(!region.is_within(photo));

        let clamped = region.clamp_to(photo);
        assert!(clamped.is_within(photo));
        assert_eq!(clamped.size, 1000.0);
        assert_eq!(clamped.origin_y, 0.0);
        assert!((clamped.origin_x - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_keeps_in_bounds_region_unchanged() {
        let region = compute_crop(GuideFrame::new(390.0, 280.0), PORTRAIT).unwrap();
        assert_eq!(region.clamp_to(PORTRAIT), region);
    }

    #[test]
    fn test_pixel_rect_is_square_and_inside() {
        let region = compute_crop(GuideFrame::new(390.0, 280.0), PORTRAIT).unwrap();
        let rect = region.to_pixel_rect(PORTRAIT).unwrap();
        assert_eq!(rect.width, rect.height);
        assert!(rect.x + rect.width <= PORTRAIT.w);
        assert!(rect.y + rect.height <= PORTRAIT.h);
    }

    #[test]
    fn test_pixel_rect_rejects_sub_pixel_region() {
        let region = CropRegion {
            origin_x: 10.0,
            origin_y: 10.0,
            size: 0.4,
        };
        assert!(matches!(
            region.to_pixel_rect(PORTRAIT),
            Err(CropError::Degenerate(_))
        ));
    }
}

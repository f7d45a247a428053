// SPDX-License-Identifier: MIT
// CPU crop path built on the `image` crate.
// Any decodable photo in → cropped RGB8 JPEG bytes out.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::geometry::{CropRegion, PixelRect, Size};
use crate::CropError;

/// JPEG quality used for uploads (compression ≈0.8).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Result of cutting the guide-frame square out of a photo.
#[derive(Debug, Clone)]
pub struct CroppedJpeg {
    pub bytes: Vec<u8>,
    pub rect: PixelRect,
}

/// Cut `rect` out of `src` and encode it as JPEG.
/// `quality` is clamped to 1..=100.
pub fn crop_to_jpeg(src: &DynamicImage, rect: PixelRect, quality: u8) -> Result<Vec<u8>, CropError> {
    let (image_w, image_h) = (src.width(), src.height());
    let fits = rect.x.checked_add(rect.width).is_some_and(|r| r <= image_w)
        && rect.y.checked_add(rect.height).is_some_and(|b| b <= image_h);
    if !fits || rect.width == 0 || rect.height == 0 {
        return Err(CropError::OutOfBounds {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            image_w,
            image_h,
        });
    }

    // JPEG carries no alpha channel
    let rgb = src.crop_imm(rect.x, rect.y, rect.width, rect.height).to_rgb8();

    let mut out = Vec::with_capacity((rect.width as usize) * (rect.height as usize) / 4);
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)?;
    Ok(out)
}

/// Decode the photo at `path`, round `region` to pixels and encode the crop.
///
/// Blocking: decode and encode are CPU-bound, callers on an async runtime
/// should run this on a blocking thread.
pub fn crop_file(path: &Path, region: CropRegion, quality: u8) -> Result<CroppedJpeg, CropError> {
    let photo = image::open(path)?;
    let size = Size {
        w: photo.width(),
        h: photo.height(),
    };
    let rect = region.to_pixel_rect(size)?;
    let bytes = crop_to_jpeg(&photo, rect, quality)?;
    Ok(CroppedJpeg { bytes, rect })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn checkerboard(w: u32, h: u32) -> DynamicImage {
        let img = RgbaImage::from_fn(w, h, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_crop_encodes_requested_size() {
        let src = checkerboard(120, 160);
        let rect = PixelRect {
            x: 10,
            y: 30,
            width: 100,
            height: 100,
        };
        let bytes = crop_to_jpeg(&src, rect, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG SOI marker");

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 100));
    }

    #[test]
    fn test_crop_rejects_rect_outside_image() {
        let src = checkerboard(64, 64);
        let rect = PixelRect {
            x: 32,
            y: 0,
            width: 64,
            height: 64,
        };
        assert!(matches!(
            crop_to_jpeg(&src, rect, DEFAULT_JPEG_QUALITY),
            Err(CropError::OutOfBounds { image_w: 64, .. })
        ));
    }
}

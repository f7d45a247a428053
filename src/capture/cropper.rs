// # Crop/Encode Capability
//
// Cuts the guide-frame square out of a photo and writes it as a JPEG into a
// temporary file. The file lives as long as some `CroppedImage` clone does:
// once the capture cycle drops it (dismiss, or the next cycle replacing the
// state) the file is deleted.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use snap_crop::cpu::{DEFAULT_JPEG_QUALITY, crop_file};
use snap_crop::geometry::{CropRegion, PixelRect};
use tempfile::TempPath;

use crate::capture::camera::Photo;
use crate::error::{PipelineError, PipelineResult};

/// The encoded crop handed to the prediction client.
#[derive(Debug, Clone)]
pub struct CroppedImage {
    uri: PathBuf,
    region: CropRegion,
    rect: PixelRect,
    byte_len: usize,
    // Deletes the file when the last clone goes away
    _temp: Option<Arc<TempPath>>,
}

impl CroppedImage {
    /// Wrap a crop whose file is owned by someone else.
    pub fn at(uri: impl Into<PathBuf>, region: CropRegion, rect: PixelRect, byte_len: usize) -> Self {
        Self {
            uri: uri.into(),
            region,
            rect,
            byte_len,
            _temp: None,
        }
    }

    fn temporary(temp: TempPath, region: CropRegion, rect: PixelRect, byte_len: usize) -> Self {
        Self {
            uri: temp.to_path_buf(),
            region,
            rect,
            byte_len,
            _temp: Some(Arc::new(temp)),
        }
    }

    pub fn uri(&self) -> &Path {
        &self.uri
    }

    pub fn region(&self) -> CropRegion {
        self.region
    }

    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

/// Abstract crop/encode interface.
#[async_trait]
pub trait ImageCropper: Send + Sync {
    /// Cut `region` out of `photo` and encode it for upload.
    ///
    /// # Errors
    /// [`PipelineError::Crop`] for degenerate regions or undecodable photos.
    async fn crop(&self, photo: &Photo, region: CropRegion) -> PipelineResult<CroppedImage>;
}

/// JPEG cropper running the CPU path on the blocking pool.
#[derive(Debug, Clone)]
pub struct JpegCropper {
    quality: u8,
    temp_dir: Option<PathBuf>,
}

impl Default for JpegCropper {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl JpegCropper {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            temp_dir: None,
        }
    }

    /// Write crops under `dir` instead of the system temp directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl ImageCropper for JpegCropper {
    async fn crop(&self, photo: &Photo, region: CropRegion) -> PipelineResult<CroppedImage> {
        let source = photo.uri.clone();
        let quality = self.quality;
        let temp_dir = self.temp_dir.clone();

        tokio::task::spawn_blocking(move || -> PipelineResult<CroppedImage> {
            let cropped = crop_file(&source, region, quality)?;

            let mut builder = tempfile::Builder::new();
            builder.prefix("food-").suffix(".jpg");
            let mut file = match temp_dir {
                Some(dir) => builder.tempfile_in(dir),
                None => builder.tempfile(),
            }
            .map_err(|e| PipelineError::crop(format!("cannot create crop file: {e}")))?;
            file.write_all(&cropped.bytes)
                .and_then(|()| file.flush())
                .map_err(|e| PipelineError::crop(format!("cannot write crop file: {e}")))?;

            Ok(CroppedImage::temporary(
                file.into_temp_path(),
                region,
                cropped.rect,
                cropped.bytes.len(),
            ))
        })
        .await
        .map_err(|e| PipelineError::crop(format!("crop task failed: {e}")))?
    }
}

// # Photo Sources
//
// The camera is an external capability: it suspends until the shutter
// produces a full-resolution photo or the hardware fails. `FileCamera` stands
// in for real hardware by "taking" an existing image file, which is how the
// CLI and the tests drive the pipeline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use snap_crop::geometry::Size;

use crate::error::{PipelineError, PipelineResult};

/// A captured photo. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub uri: PathBuf,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl Photo {
    pub fn new(uri: impl Into<PathBuf>, pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            uri: uri.into(),
            pixel_width,
            pixel_height,
        }
    }

    pub fn size(&self) -> Size {
        Size {
            w: self.pixel_width,
            h: self.pixel_height,
        }
    }
}

/// Abstract interface for photo sources.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Take one full-resolution photo.
    ///
    /// # Errors
    /// [`PipelineError::Capture`] when no photo could be produced.
    async fn take_picture(&self) -> PipelineResult<Photo>;
}

/// Camera backed by an image file on disk.
#[derive(Debug, Clone)]
pub struct FileCamera {
    path: PathBuf,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Camera for FileCamera {
    async fn take_picture(&self) -> PipelineResult<Photo> {
        let path = self.path.clone();
        // Header-only read, but still blocking file I/O
        let dims = tokio::task::spawn_blocking(move || image::image_dimensions(&path))
            .await
            .map_err(|e| PipelineError::capture(format!("capture task failed: {e}")))?;

        let (w, h) = dims.map_err(|e| {
            PipelineError::capture(format!("cannot read photo {}: {e}", self.path.display()))
        })?;
        if w == 0 || h == 0 {
            return Err(PipelineError::capture(format!(
                "photo {} has no pixels",
                self.path.display()
            )));
        }

        Ok(Photo::new(self.path.clone(), w, h))
    }
}

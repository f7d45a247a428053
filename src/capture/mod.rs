// # Capture Module
//
// Photo sources and the crop/encode step that turns a photo into the upload.

pub mod camera;
pub mod cropper;

pub use camera::{Camera, FileCamera, Photo};
pub use cropper::{CroppedImage, ImageCropper, JpegCropper};

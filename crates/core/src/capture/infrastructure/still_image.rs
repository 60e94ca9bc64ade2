use std::path::Path;

use crate::capture::domain::frame_source::CaptureError;
use crate::shared::frame::{CapturedFrame, Orientation};

/// Decodes an image file into an upright RGBA frame.
///
/// `video_frame` marks whether the frame should be treated as part of a live
/// stream or as a standalone still.
pub fn decode_image(path: &Path, video_frame: bool) -> Result<CapturedFrame, CaptureError> {
    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(source) => CaptureError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => CaptureError::Decode {
            path: path.to_path_buf(),
            source: other,
        },
    })?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(CapturedFrame::new(
        rgba.into_raw(),
        width,
        height,
        Orientation::Rotated0,
        video_frame,
    ))
}

/// Loads a single still image for one-shot recognition.
pub fn load_still_image(path: &Path) -> Result<CapturedFrame, CaptureError> {
    decode_image(path, false)
}

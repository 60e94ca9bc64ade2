use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::capture::infrastructure::still_image::decode_image;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::{CapturedFrame, Orientation};

/// Serves a directory of still images as a live video stream, in file name
/// order.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    looping: bool,
    mirrored: bool,
    orientation: Orientation,
    closed: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, CaptureError> {
        let entries = fs::read_dir(dir).map_err(|source| CaptureError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(CaptureError::NoDevice(format!(
                "no images in {}",
                dir.display()
            )));
        }
        log::debug!("image sequence of {} frame(s) from {}", paths.len(), dir.display());

        Ok(Self {
            paths,
            next: 0,
            looping: false,
            mirrored: false,
            orientation: Orientation::Rotated0,
            closed: false,
        })
    }

    /// Restart from the first image instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Report frames as coming from a mirrored (front-facing) camera.
    pub fn mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn acquire(&mut self) -> Result<CapturedFrame, CaptureError> {
        if self.closed {
            return Err(CaptureError::Ended);
        }
        if self.next >= self.paths.len() {
            if !self.looping {
                return Err(CaptureError::Ended);
            }
            self.next = 0;
        }
        let path = &self.paths[self.next];
        self.next += 1;

        let frame = decode_image(path, true)?;
        let (width, height) = (frame.width(), frame.height());
        Ok(CapturedFrame::new(
            frame.into_pixels(),
            width,
            height,
            self.orientation,
            true,
        ))
    }

    fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

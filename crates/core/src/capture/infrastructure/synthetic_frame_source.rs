use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::frame::{CapturedFrame, Orientation, RGBA_CHANNELS};

/// Generates uniform RGBA frames at a fixed frame interval, standing in for a
/// camera in headless runs.
///
/// The shade changes every frame so consecutive frames are distinguishable.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    last_frame: Option<Instant>,
    produced: u64,
    limit: Option<u64>,
    mirrored: bool,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, frame_interval: Duration) -> Self {
        Self {
            width,
            height,
            frame_interval,
            last_frame: None,
            produced: 0,
            limit: None,
            mirrored: false,
        }
    }

    /// End the stream after `limit` frames.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl FrameSource for SyntheticFrameSource {
    fn wait_frame_ready(&mut self, max_wait: Duration) -> bool {
        let Some(last) = self.last_frame else {
            return true;
        };
        let ready_at = last + self.frame_interval;
        let now = Instant::now();
        if now >= ready_at {
            return true;
        }
        let wait = ready_at - now;
        if wait > max_wait {
            std::thread::sleep(max_wait);
            return false;
        }
        std::thread::sleep(wait);
        true
    }

    fn acquire(&mut self) -> Result<CapturedFrame, CaptureError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Err(CaptureError::Ended);
        }
        let shade = (self.produced % 256) as u8;
        let len = self.width as usize * self.height as usize * RGBA_CHANNELS;
        let mut pixels = vec![shade; len];
        for alpha in pixels.iter_mut().skip(RGBA_CHANNELS - 1).step_by(RGBA_CHANNELS) {
            *alpha = u8::MAX;
        }
        self.produced += 1;
        self.last_frame = Some(Instant::now());
        Ok(CapturedFrame::new(
            pixels,
            self.width,
            self.height,
            Orientation::Rotated0,
            true,
        ))
    }

    fn is_mirrored(&self) -> bool {
        self.mirrored
    }
}

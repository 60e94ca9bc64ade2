/// Rotation of the captured pixels relative to the upright scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Rotated0,
    Rotated90,
    Rotated180,
    Rotated270,
}

impl Orientation {
    pub fn degrees(self) -> u32 {
        match self {
            Orientation::Rotated0 => 0,
            Orientation::Rotated90 => 90,
            Orientation::Rotated180 => 180,
            Orientation::Rotated270 => 270,
        }
    }

    /// Maps a rotation in degrees to the nearest quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        match ((degrees % 360 + 360) % 360 + 45) / 90 % 4 {
            1 => Orientation::Rotated90,
            2 => Orientation::Rotated180,
            3 => Orientation::Rotated270,
            _ => Orientation::Rotated0,
        }
    }
}

/// A single captured frame: contiguous RGBA bytes in row-major order.
///
/// Frames are moved, never cloned, when submitted to the worker; the pixel
/// buffer travels with the request and is owned by the engine afterwards.
#[derive(Debug, PartialEq)]
pub struct CapturedFrame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    orientation: Orientation,
    video_frame: bool,
}

pub const RGBA_CHANNELS: usize = 4;

impl CapturedFrame {
    pub fn new(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        orientation: Orientation,
        video_frame: bool,
    ) -> Self {
        debug_assert_eq!(
            pixels.len(),
            (width as usize) * (height as usize) * RGBA_CHANNELS,
            "pixel length must equal width * height * 4"
        );
        Self {
            pixels,
            width,
            height,
            orientation,
            video_frame,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Whether the frame comes from a live video feed (as opposed to a still).
    pub fn is_video_frame(&self) -> bool {
        self.video_frame
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Consumes the frame and hands out its pixel buffer without copying.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

//! Captured frames.
//!
//! - `Frame`: opaque pixel buffer with dimensions, pixel format and orientation hint.
//! - `PixelFormat`: packed byte layouts the capture devices produce.
//! - `Orientation`: how the sensor image must be rotated to appear upright.
//!
//! A frame is produced once per capture tick and moved into the inference call.
//! There is no `Clone`: after the detection pass completes the frame is dropped.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb8,
    Bgra8,
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Bgra8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Orientation hint attached to each frame.
///
/// `Right` means the upright image is the sensor image rotated 90° clockwise,
/// which is how a portrait phone reads its back camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

impl Orientation {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Orientation::Up),
            "right" => Ok(Orientation::Right),
            "down" => Ok(Orientation::Down),
            "left" => Ok(Orientation::Left),
            other => Err(anyhow!("unknown orientation '{}'", other)),
        }
    }

    /// Size of the upright image for a sensor image of `width` x `height`.
    pub fn oriented_size(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::Up | Orientation::Down => (width, height),
            Orientation::Right | Orientation::Left => (height, width),
        }
    }

    /// Map a pixel of the upright image back to the sensor image.
    ///
    /// `width`/`height` are the sensor dimensions.
    pub fn source_coord(self, u: u32, v: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::Up => (u, v),
            Orientation::Down => (width - 1 - u, height - 1 - v),
            // upright is sensor rotated 90° clockwise: upright (u, v) <- sensor (v, H-1-u)
            Orientation::Right => (v, height - 1 - u),
            Orientation::Left => (width - 1 - v, u),
        }
    }
}

pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub orientation: Orientation,
    /// Per-session capture sequence number, starting at 1.
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        orientation: Orientation,
        sequence: u64,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} bytes for {}x{} {:?}, received {}",
                expected,
                width,
                height,
                format,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            orientation,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Milliseconds since capture.
    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }

    /// RGB value of a sensor pixel.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let bpp = self.format.bytes_per_pixel();
        let idx = (y as usize * self.width as usize + x as usize) * bpp;
        match self.format {
            PixelFormat::Rgb8 => [self.data[idx], self.data[idx + 1], self.data[idx + 2]],
            PixelFormat::Bgra8 => [self.data[idx + 2], self.data[idx + 1], self.data[idx]],
            PixelFormat::Gray8 => [self.data[idx]; 3],
        }
    }

    /// Size of the frame once the orientation hint is applied.
    pub fn oriented_size(&self) -> (u32, u32) {
        self.orientation.oriented_size(self.width, self.height)
    }

    /// RGB value at (`u`, `v`) in the upright image.
    pub fn oriented_rgb_at(&self, u: u32, v: u32) -> [u8; 3] {
        let (x, y) = self
            .orientation
            .source_coord(u, v, self.width, self.height);
        self.rgb_at(x, y)
    }
}

impl std::fmt::Debug for Frame {
    // Pixel bytes are deliberately left out.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("orientation", &self.orientation)
            .field("sequence", &self.sequence)
            .finish()
    }
}

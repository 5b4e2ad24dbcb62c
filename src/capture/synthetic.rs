//! Synthetic capture device (`stub://name`).
//!
//! Produces RGB frames at the preset's resolution: a dark gradient background
//! with a bright square that drifts across the scene, so detectors and the
//! overlay have something that moves.

use anyhow::Result;

use crate::frame::{Frame, Orientation, PixelFormat};

use super::{CaptureDevice, CaptureSettings};

const SQUARE_FRACTION: u32 = 6;

pub struct SyntheticDevice {
    name: String,
    width: u32,
    height: u32,
    orientation: Orientation,
    frame_count: u64,
}

impl SyntheticDevice {
    pub fn new(name: &str, settings: &CaptureSettings) -> Self {
        let (width, height) = settings.preset.dimensions();
        log::info!("SyntheticDevice: opened stub://{} ({}x{})", name, width, height);
        Self {
            name: name.to_string(),
            width,
            height,
            orientation: settings.orientation,
            frame_count: 0,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let side = (self.height / SQUARE_FRACTION).max(1) as usize;
        let travel = w.saturating_sub(side).max(1);
        let left = (self.frame_count as usize * 4) % travel;
        let top = (h - side) / 2;

        let mut pixels = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) * 3;
                let inside = x >= left && x < left + side && y >= top && y < top + side;
                if inside {
                    pixels[idx..idx + 3].copy_from_slice(&[240, 240, 240]);
                } else {
                    let shade = ((x + y + self.frame_count as usize) % 64) as u8;
                    pixels[idx..idx + 3].copy_from_slice(&[shade, shade / 2, 32]);
                }
            }
        }
        pixels
    }
}

impl CaptureDevice for SyntheticDevice {
    fn describe(&self) -> String {
        format!("stub://{} (synthetic)", self.name)
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(
            pixels,
            self.width,
            self.height,
            PixelFormat::Rgb8,
            self.orientation,
            self.frame_count,
        )
    }
}

//! Render surfaces.
//!
//! A surface accepts a full list of draw commands and replaces whatever it
//! showed before. Surfaces are owned by exactly one thread.

use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};

use super::state::DrawCommand;
use super::transform::{PixelRect, SurfaceSize};

pub trait RenderSurface {
    fn size(&self) -> SurfaceSize;

    /// Replace every child of the surface with `commands`.
    fn replace(&mut self, commands: &[DrawCommand]) -> Result<()>;
}

/// Keeps the last command list. Used for headless runs and tests.
#[derive(Debug)]
pub struct RecordingSurface {
    size: SurfaceSize,
    commands: Vec<DrawCommand>,
    updates: u64,
}

impl RecordingSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: SurfaceSize::new(width, height),
            commands: Vec::new(),
            updates: 0,
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn rects(&self) -> Vec<PixelRect> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::StrokeRect { rect, .. } => Some(*rect),
                DrawCommand::Text { .. } => None,
            })
            .collect()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl RenderSurface for RecordingSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn replace(&mut self, commands: &[DrawCommand]) -> Result<()> {
        self.commands = commands.to_vec();
        self.updates += 1;
        Ok(())
    }
}

/// Rasterizes the overlay onto an RGBA image over a fixed background.
///
/// There is no font rasterizer: label commands paint a translucent tab in the
/// label frame so the label position stays visible in snapshots.
pub struct ImageSurface {
    background: RgbaImage,
    canvas: RgbaImage,
}

impl ImageSurface {
    /// Transparent surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_background(RgbaImage::new(width, height))
    }

    pub fn with_background(background: RgbaImage) -> Self {
        let canvas = background.clone();
        Self { background, canvas }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.canvas
            .save(path)
            .with_context(|| format!("writing overlay snapshot to {}", path.display()))
    }
}

impl RenderSurface for ImageSurface {
    fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.canvas.width() as f32, self.canvas.height() as f32)
    }

    fn replace(&mut self, commands: &[DrawCommand]) -> Result<()> {
        self.canvas.clone_from(&self.background);
        for command in commands {
            match command {
                DrawCommand::StrokeRect {
                    rect,
                    color,
                    line_width,
                } => {
                    let thickness = line_width.round() as u32;
                    stroke_rect(&mut self.canvas, *rect, Rgba(*color), thickness);
                }
                DrawCommand::Text { frame, color, .. } => {
                    let mut tab = *color;
                    tab[3] /= 3;
                    fill_rect(&mut self.canvas, *frame, Rgba(tab));
                }
            }
        }
        Ok(())
    }
}

/// Pixel bounds of `rect` clipped to the image, as inclusive corners.
fn clip(img: &RgbaImage, rect: PixelRect) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let x0 = rect.x.max(0.0);
    let y0 = rect.y.max(0.0);
    let x1 = (rect.x + rect.width).min(w as f32) - 1.0;
    let y1 = (rect.y + rect.height).min(h as f32) - 1.0;
    if x1 < x0 || y1 < y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

fn stroke_rect(img: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>, thickness: u32) {
    let Some((x0, y0, x1, y1)) = clip(img, rect) else {
        return;
    };
    for t in 0..thickness.max(1) {
        let (xx0, yy0) = (x0 + t, y0 + t);
        let (xx1, yy1) = (x1.saturating_sub(t), y1.saturating_sub(t));
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn fill_rect(img: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>) {
    let Some((x0, y0, x1, y1)) = clip(img, rect) else {
        return;
    };
    let alpha = color[3] as u16;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let px = img.get_pixel_mut(x, y);
            for c in 0..3 {
                px[c] = ((color[c] as u16 * alpha + px[c] as u16 * (255 - alpha)) / 255) as u8;
            }
            px[3] = px[3].max(color[3]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::state::BOX_COLOR;

    fn stroke(x: f32, y: f32, w: f32, h: f32) -> DrawCommand {
        DrawCommand::StrokeRect {
            rect: PixelRect::new(x, y, w, h),
            color: BOX_COLOR,
            line_width: 2.0,
        }
    }

    #[test]
    fn recording_surface_keeps_only_last_update() -> Result<()> {
        let mut surface = RecordingSurface::new(100.0, 100.0);
        surface.replace(&[stroke(0.0, 0.0, 10.0, 10.0), stroke(5.0, 5.0, 10.0, 10.0)])?;
        surface.replace(&[stroke(1.0, 1.0, 2.0, 2.0)])?;
        assert_eq!(surface.rects(), vec![PixelRect::new(1.0, 1.0, 2.0, 2.0)]);
        assert_eq!(surface.updates(), 2);
        Ok(())
    }

    #[test]
    fn image_surface_strokes_border_only() -> Result<()> {
        let mut surface = ImageSurface::new(20, 20);
        surface.replace(&[stroke(5.0, 5.0, 10.0, 10.0)])?;
        let img = surface.image();
        assert_eq!(img.get_pixel(5, 5).0, BOX_COLOR);
        assert_eq!(img.get_pixel(14, 14).0, BOX_COLOR);
        assert_eq!(img.get_pixel(10, 10).0, [0, 0, 0, 0]);
        assert_eq!(img.get_pixel(4, 4).0, [0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn image_surface_resets_to_background() -> Result<()> {
        let mut surface = ImageSurface::new(20, 20);
        surface.replace(&[stroke(0.0, 0.0, 20.0, 20.0)])?;
        surface.replace(&[])?;
        assert!(surface.image().pixels().all(|px| px.0 == [0, 0, 0, 0]));
        Ok(())
    }

    #[test]
    fn offscreen_rect_is_clipped() -> Result<()> {
        let mut surface = ImageSurface::new(10, 10);
        surface.replace(&[stroke(-5.0, -5.0, 100.0, 100.0), stroke(50.0, 50.0, 5.0, 5.0)])?;
        assert_eq!(surface.image().get_pixel(0, 0).0, BOX_COLOR);
        assert_eq!(surface.image().get_pixel(9, 9).0, BOX_COLOR);
        Ok(())
    }
}

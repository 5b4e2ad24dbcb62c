use crate::detect::NormalizedRect;

/// Size of the render surface in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSize {
    pub width: f32,
    pub height: f32,
}

impl SurfaceSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Rectangle in surface pixels, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Map a detector box (normalized, bottom-left origin) onto the surface
/// (pixels, top-left origin).
pub fn to_surface_rect(bbox: NormalizedRect, surface: SurfaceSize) -> PixelRect {
    PixelRect {
        x: bbox.x * surface.width,
        y: (1.0 - bbox.y - bbox.h) * surface.height,
        width: bbox.w * surface.width,
        height: bbox.h * surface.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_vertical_origin() {
        let rect = to_surface_rect(
            NormalizedRect::new(0.25, 0.25, 0.5, 0.25),
            SurfaceSize::new(200.0, 100.0),
        );
        assert_eq!(rect, PixelRect::new(50.0, 50.0, 100.0, 25.0));
    }

    #[test]
    fn box_touching_bottom_edge_lands_at_surface_bottom() {
        let surface = SurfaceSize::new(390.0, 844.0);
        let rect = to_surface_rect(NormalizedRect::new(0.0, 0.0, 1.0, 0.5), surface);
        assert_eq!(rect.y, 422.0);
        assert_eq!(rect.y + rect.height, 844.0);
    }

    #[test]
    fn full_box_covers_surface() {
        let surface = SurfaceSize::new(640.0, 480.0);
        let rect = to_surface_rect(NormalizedRect::FULL, surface);
        assert_eq!(rect, PixelRect::new(0.0, 0.0, 640.0, 480.0));
    }
}

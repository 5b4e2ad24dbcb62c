use serde::{Deserialize, Serialize};

/// Normalized box in the detector's convention: all values in [0, 1] relative
/// to the frame, origin at the bottom-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl NormalizedRect {
    pub const FULL: NormalizedRect = NormalizedRect {
        x: 0.0,
        y: 0.0,
        w: 1.0,
        h: 1.0,
    };

    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Build from corner coordinates given with a top-left origin (image rows
    /// counted downward), the layout most exported models emit.
    pub fn from_top_left_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let (left, right) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (top, bottom) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Self {
            x: left,
            y: 1.0 - bottom,
            w: right - left,
            h: bottom - top,
        }
    }

    /// Express a box that is normalized to `region` in the coordinates of the
    /// space `region` itself lives in.
    pub fn within(self, region: NormalizedRect) -> Self {
        Self {
            x: region.x + self.x * region.w,
            y: region.y + self.y * region.h,
            w: self.w * region.w,
            h: self.h * region.h,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: NormalizedRect,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Detection {
    pub fn new(bbox: NormalizedRect, confidence: f32) -> Self {
        Self {
            bbox,
            confidence,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

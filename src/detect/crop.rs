//! Crop/scale policy between a frame and a fixed-size model input.

use anyhow::{anyhow, Result};
use serde::Deserialize;

use super::result::NormalizedRect;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropScale {
    /// Scale the short side to the model input and crop the centre.
    #[default]
    CenterCrop,
    /// Letterbox: the whole frame fits inside the model input.
    ScaleFit,
    /// Stretch the frame to the model input, ignoring aspect ratio.
    ScaleFill,
}

impl CropScale {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "center-crop" | "centercrop" => Ok(CropScale::CenterCrop),
            "scale-fit" | "scalefit" => Ok(CropScale::ScaleFit),
            "scale-fill" | "scalefill" => Ok(CropScale::ScaleFill),
            other => Err(anyhow!(
                "unknown crop policy '{}' (expected center-crop, scale-fit or scale-fill)",
                other
            )),
        }
    }

    /// Work out where an upright frame of `frame_w` x `frame_h` lands in a
    /// model input of `model_w` x `model_h`.
    pub fn placement(self, frame_w: u32, frame_h: u32, model_w: u32, model_h: u32) -> Placement {
        let frame_aspect = frame_w as f32 / frame_h as f32;
        let model_aspect = model_w as f32 / model_h as f32;
        match self {
            CropScale::ScaleFill => Placement {
                source: NormalizedRect::FULL,
                content: NormalizedRect::FULL,
            },
            CropScale::CenterCrop => Placement {
                source: centered(frame_aspect, model_aspect),
                content: NormalizedRect::FULL,
            },
            CropScale::ScaleFit => Placement {
                source: NormalizedRect::FULL,
                content: centered(model_aspect, frame_aspect),
            },
        }
    }
}

/// Largest centred region of an `outer_aspect` space that has `inner_aspect`.
fn centered(outer_aspect: f32, inner_aspect: f32) -> NormalizedRect {
    if outer_aspect > inner_aspect {
        let w = inner_aspect / outer_aspect;
        NormalizedRect::new((1.0 - w) / 2.0, 0.0, w, 1.0)
    } else {
        let h = outer_aspect / inner_aspect;
        NormalizedRect::new(0.0, (1.0 - h) / 2.0, 1.0, h)
    }
}

/// Mapping between frame space and model-input space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Region of the frame that is sampled.
    pub source: NormalizedRect,
    /// Region of the model input covered by that sample.
    pub content: NormalizedRect,
}

impl Placement {
    /// Frame position (normalized, top-left origin) for a model-input
    /// position (normalized, top-left origin). `None` falls in padding.
    pub fn sample(&self, u: f32, v: f32) -> Option<(f32, f32)> {
        let c = self.content;
        let c_top = 1.0 - c.y - c.h;
        if u < c.x || u > c.x + c.w || v < c_top || v > c_top + c.h {
            return None;
        }
        let ru = (u - c.x) / c.w;
        let rv = (v - c_top) / c.h;
        let s = self.source;
        let s_top = 1.0 - s.y - s.h;
        Some((s.x + ru * s.w, s_top + rv * s.h))
    }

    /// Convert a detection box from model-input space to frame space.
    pub fn to_frame(&self, rect: NormalizedRect) -> NormalizedRect {
        let c = self.content;
        NormalizedRect::new(
            (rect.x - c.x) / c.w,
            (rect.y - c.y) / c.h,
            rect.w / c.w,
            rect.h / c.h,
        )
        .within(self.source)
    }
}

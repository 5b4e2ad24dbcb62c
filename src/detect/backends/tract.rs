#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::InferenceBackend;
use crate::detect::crop::{CropScale, Placement};
use crate::detect::result::{Detection, NormalizedRect};
use crate::frame::Frame;

/// Tract-based backend for ONNX object detectors.
///
/// Input is `[1, 3, H, W]` f32 RGB in [0, 1], sampled from the upright frame
/// according to the crop/scale policy. Output is expected as rows of
/// `[x0, y0, x1, y1, score, class]` with corners normalized to the model input
/// and a top-left origin (detectors exported with NMS baked in).
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            labels: Vec::new(),
        })
    }

    /// Class names indexed by the model's class column.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    fn build_input(&self, frame: &Frame, placement: &Placement) -> Tensor {
        let (up_w, up_h) = frame.oriented_size();
        let (mw, mh) = (self.width as usize, self.height as usize);

        let mut rgb = vec![0.0f32; mw * mh * 3];
        for my in 0..mh {
            for mx in 0..mw {
                let u = (mx as f32 + 0.5) / mw as f32;
                let v = (my as f32 + 0.5) / mh as f32;
                let Some((fu, fv)) = placement.sample(u, v) else {
                    continue;
                };
                let px = ((fu * up_w as f32) as u32).min(up_w - 1);
                let py = ((fv * up_h as f32) as u32).min(up_h - 1);
                let [r, g, b] = frame.oriented_rgb_at(px, py);
                let idx = (my * mw + mx) * 3;
                rgb[idx] = r as f32 / 255.0;
                rgb[idx + 1] = g as f32 / 255.0;
                rgb[idx + 2] = b as f32 / 255.0;
            }
        }

        let input = tract_ndarray::Array4::from_shape_fn((1, 3, mh, mw), |(_, channel, y, x)| {
            rgb[(y * mw + x) * 3 + channel]
        });
        input.into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, placement: Placement) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        let cols = *shape.last().ok_or_else(|| anyhow!("model output is a scalar"))?;
        if cols < 5 {
            return Err(anyhow!("model output rows have {} columns, need at least 5", cols));
        }
        let values: Vec<f32> = view.iter().copied().collect();

        let mut detections = Vec::with_capacity(values.len() / cols);
        for row in values.chunks_exact(cols) {
            let score = row[4];
            if !score.is_finite() {
                continue;
            }
            let model_box = NormalizedRect::from_top_left_corners(row[0], row[1], row[2], row[3]);
            let mut detection =
                Detection::new(placement.to_frame(model_box), score.clamp(0.0, 1.0));
            if cols > 5 {
                let class = row[5];
                if class >= 0.0 {
                    if let Some(label) = self.labels.get(class as usize) {
                        detection.label = Some(label.clone());
                    }
                }
            }
            detections.push(detection);
        }
        Ok(detections)
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame, policy: CropScale) -> Result<Vec<Detection>> {
        let (up_w, up_h) = frame.oriented_size();
        let placement = policy.placement(up_w, up_h, self.width, self.height);
        let input = self.build_input(frame, &placement);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, placement)
    }
}

#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Candidates below this score are dropped before NMS.
const CANDIDATE_FLOOR: f32 = 0.05;
const NMS_IOU: f32 = 0.45;
const MAX_CANDIDATES: usize = 300;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single output tensor shaped `[1, 4 + classes, anchors]`
/// (or its transpose) with `cx, cy, w, h` in input pixels followed by
/// per-class scores. Frames are resized to the square model input.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);
        let size = size as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        })
        .into_tensor()
    }

    fn decode_output(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not rank 3")?;
        let attrs_first = shape[1] < shape[2];
        let (attrs, anchors) = if attrs_first {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };
        if attrs < 5 {
            return Err(anyhow!("model output has {} attributes, need >= 5", attrs));
        }

        let at = |anchor: usize, attr: usize| {
            if attrs_first {
                view[[0, attr, anchor]]
            } else {
                view[[0, anchor, attr]]
            }
        };
        let scale = self.input_size as f32;
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (4..attrs)
                .map(|attr| (attr - 4, at(anchor, attr)))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < CANDIDATE_FLOOR {
                continue;
            }
            let (cx, cy, w, h) = (
                at(anchor, 0),
                at(anchor, 1),
                at(anchor, 2),
                at(anchor, 3),
            );
            candidates.push(Detection {
                x: ((cx - w / 2.0) / scale).clamp(0.0, 1.0),
                y: ((cy - h / 2.0) / scale).clamp(0.0, 1.0),
                w: (w / scale).clamp(0.0, 1.0),
                h: (h / scale).clamp(0.0, 1.0),
                confidence: score.min(1.0),
                class_id: class_id as u32,
            });
        }
        Ok(non_max_suppression(candidates, NMS_IOU, MAX_CANDIDATES))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_output(outputs)
    }

    fn warm_up(&self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank).map(|_| ())
    }
}

/// Greedy per-class NMS. Output is sorted by descending confidence; ties keep
/// their input order.
fn non_max_suppression(mut candidates: Vec<Detection>, iou: f32, limit: usize) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        if kept.len() >= limit {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.iou(&cand) > iou);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

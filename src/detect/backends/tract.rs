#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{finalize, Candidate};
use crate::detect::result::{BoundingBox, DetectionSet};
use crate::frame::Frame;
use crate::settings::Thresholds;

/// Letterbox padding value used by YOLO exports.
const PAD_VALUE: u8 = 114;

/// Tract-based backend for YOLOv8-style ONNX exports.
///
/// The model takes a `1x3xSxS` float input in `[0, 1]` and yields
/// `1x(4+C)xN` rows of `cx, cy, w, h` followed by per-class scores.
/// The weights are loaded from a local file once; nothing else touches disk.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
}

/// Where the frame sits inside the square model input.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be > 0"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );
        Ok(Self { model, input_size })
    }

    fn letterbox(&self, frame: &Frame) -> Result<(Tensor, Letterbox)> {
        let (w, h) = (frame.width(), frame.height());
        if w == 0 || h == 0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let side = self.input_size;
        let scale = (side as f32 / w as f32).min(side as f32 / h as f32);
        let new_w = ((w as f32 * scale).round() as u32).clamp(1, side);
        let new_h = ((h as f32 * scale).round() as u32).clamp(1, side);
        let pad_x = (side - new_w) / 2;
        let pad_y = (side - new_h) / 2;

        let resized = imageops::resize(frame.image(), new_w, new_h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(side, side, Rgb([PAD_VALUE; 3]));
        imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        Ok((
            input.into_tensor(),
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        ))
    }

    fn decode(&self, output: &Tensor, letterbox: Letterbox) -> Result<Vec<Candidate>> {
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        // Exports come as 1x(4+C)xN; some tools transpose to 1xNx(4+C).
        let channels_first = shape[1] < shape[2];
        let (features, anchors) = if channels_first {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };
        if features < 5 {
            return Err(anyhow!("model output has {} features, need at least 5", features));
        }
        let at = |feature: usize, anchor: usize| -> f32 {
            if channels_first {
                view[[0, feature, anchor]]
            } else {
                view[[0, anchor, feature]]
            }
        };

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let score = (4..features)
                .map(|f| at(f, anchor))
                .fold(f32::NEG_INFINITY, f32::max);
            if !score.is_finite() || score <= 0.0 {
                continue;
            }
            let (cx, cy, bw, bh) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
            let x1 = (cx - bw / 2.0 - letterbox.pad_x) / letterbox.scale;
            let y1 = (cy - bh / 2.0 - letterbox.pad_y) / letterbox.scale;
            let x2 = (cx + bw / 2.0 - letterbox.pad_x) / letterbox.scale;
            let y2 = (cy + bh / 2.0 - letterbox.pad_y) / letterbox.scale;
            candidates.push(Candidate {
                bbox: BoundingBox::from_corners(x1, y1, x2, y2),
                score,
            });
        }
        Ok(candidates)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<DetectionSet> {
        let (input, letterbox) = self.letterbox(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let candidates = self.decode(output, letterbox)?;
        Ok(finalize(candidates, thresholds, frame.width(), frame.height()))
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size;
        let blank = Frame::new(
            RgbImage::from_pixel(side, side, Rgb([PAD_VALUE; 3])),
            crate::frame::FrameOrigin::SingleImage,
            0,
        );
        self.detect(&blank, &Thresholds::default()).map(|_| ())
    }
}

//! Post-processing shared by every backend: confidence filter, non-maximum
//! suppression and the per-frame cap.

use std::cmp::Ordering;

use crate::detect::result::{BoundingBox, Detection, DetectionSet};
use crate::settings::Thresholds;

/// Raw candidate straight out of a model, before filtering.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Turn raw candidates into a `DetectionSet` for a `width` x `height` frame.
pub fn finalize(
    candidates: Vec<Candidate>,
    thresholds: &Thresholds,
    width: u32,
    height: u32,
) -> DetectionSet {
    let mut kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.score.is_finite() && c.score >= thresholds.confidence)
        .map(|c| Candidate {
            bbox: c.bbox.clamp_to(width, height),
            score: c.score.min(1.0),
        })
        .filter(|c| c.bbox.area() > 0.0)
        .collect();

    nms(&mut kept, thresholds.iou);
    kept.truncate(thresholds.max_detections);

    DetectionSet::from_sorted(
        kept.into_iter()
            .map(|c| Detection::pothole(c.bbox, c.score))
            .collect(),
    )
}

/// Greedy class-agnostic NMS. Leaves `boxes` sorted by descending score.
pub fn nms(boxes: &mut Vec<Candidate>, iou_threshold: f32) {
    boxes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<Candidate> = Vec::with_capacity(boxes.len());
    for candidate in boxes.drain(..) {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    *boxes = keep;
}

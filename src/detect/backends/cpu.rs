use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{finalize, Candidate};
use crate::detect::result::{BoundingBox, DetectionSet};
use crate::frame::Frame;
use crate::settings::Thresholds;

/// Cells per side on the shorter frame edge.
const GRID_CELLS: u32 = 16;
const MIN_CELL_PX: u32 = 4;
/// Relative darkness a cell needs to join a patch.
const SEED_DARKNESS: f32 = 0.2;

/// CPU backend that flags dark patches on the road surface.
///
/// The frame is tiled into square cells. Cells whose mean luminance is well
/// below the frame mean are grouped into 4-connected patches; each patch
/// becomes one candidate scored by its mean relative darkness. Needs no model
/// file and is fully deterministic.
#[derive(Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<DetectionSet> {
        let candidates = dark_patches(frame);
        Ok(finalize(candidates, thresholds, frame.width(), frame.height()))
    }
}

fn luminance(p: &image::Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

fn dark_patches(frame: &Frame) -> Vec<Candidate> {
    let (w, h) = (frame.width(), frame.height());
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let cell = (w.min(h) / GRID_CELLS).max(MIN_CELL_PX);
    let cols = w.div_ceil(cell) as usize;
    let rows = h.div_ceil(cell) as usize;

    let mut sums = vec![0f32; cols * rows];
    let mut counts = vec![0u32; cols * rows];
    let mut total = 0f32;
    for (x, y, p) in frame.image().enumerate_pixels() {
        let l = luminance(p);
        let idx = (y / cell) as usize * cols + (x / cell) as usize;
        sums[idx] += l;
        counts[idx] += 1;
        total += l;
    }
    let frame_mean = total / (w as f32 * h as f32);
    if frame_mean <= 0.0 {
        return Vec::new();
    }

    let darkness: Vec<f32> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| ((frame_mean - s / c.max(1) as f32) / frame_mean).clamp(0.0, 1.0))
        .collect();

    let mut visited = vec![false; cols * rows];
    let mut candidates = Vec::new();
    for start in 0..cols * rows {
        if visited[start] || darkness[start] < SEED_DARKNESS {
            continue;
        }
        let mut stack = vec![start];
        visited[start] = true;
        let (mut c0, mut r0, mut c1, mut r1) = (usize::MAX, usize::MAX, 0, 0);
        let mut score_sum = 0f32;
        let mut members = 0usize;

        while let Some(idx) = stack.pop() {
            let (c, r) = (idx % cols, idx / cols);
            c0 = c0.min(c);
            r0 = r0.min(r);
            c1 = c1.max(c);
            r1 = r1.max(r);
            score_sum += darkness[idx];
            members += 1;

            let mut neighbours = Vec::with_capacity(4);
            if c > 0 {
                neighbours.push(idx - 1);
            }
            if c + 1 < cols {
                neighbours.push(idx + 1);
            }
            if r > 0 {
                neighbours.push(idx - cols);
            }
            if r + 1 < rows {
                neighbours.push(idx + cols);
            }
            for n in neighbours {
                if !visited[n] && darkness[n] >= SEED_DARKNESS {
                    visited[n] = true;
                    stack.push(n);
                }
            }
        }

        let cell = cell as f32;
        candidates.push(Candidate {
            bbox: BoundingBox::from_corners(
                c0 as f32 * cell,
                r0 as f32 * cell,
                (c1 + 1) as f32 * cell,
                (r1 + 1) as f32 * cell,
            ),
            score: score_sum / members as f32,
        });
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameOrigin;
    use image::{Rgb, RgbImage};

    fn road_with_hole() -> Frame {
        let image = RgbImage::from_fn(128, 128, |x, y| {
            if (40..72).contains(&x) && (48..80).contains(&y) {
                Rgb([10, 10, 10])
            } else {
                Rgb([180, 180, 180])
            }
        });
        Frame::new(image, FrameOrigin::SingleImage, 0)
    }

    #[test]
    fn finds_single_dark_patch() {
        let mut backend = CpuBackend::new();
        let set = backend
            .detect(&road_with_hole(), &Thresholds::new(0.25).unwrap())
            .unwrap();
        assert_eq!(set.len(), 1);
        let d = &set.as_slice()[0];
        assert_eq!(d.label, "pothole");
        assert_eq!(d.bbox, BoundingBox::new(40.0, 48.0, 32.0, 32.0));
        assert!(d.score >= 0.25 && d.score <= 1.0);
    }

    #[test]
    fn uniform_frame_has_no_detections() {
        let frame = Frame::new(
            RgbImage::from_pixel(64, 64, Rgb([120, 120, 120])),
            FrameOrigin::SingleImage,
            0,
        );
        let set = CpuBackend::new()
            .detect(&frame, &Thresholds::default())
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn detection_is_deterministic() {
        let frame = road_with_hole();
        let t = Thresholds::new(0.3).unwrap();
        let mut backend = CpuBackend::new();
        let a = backend.detect(&frame, &t).unwrap();
        let b = backend.detect(&frame, &t).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn strict_threshold_filters_patch() {
        let set = CpuBackend::new()
            .detect(&road_with_hole(), &Thresholds::new(1.0).unwrap())
            .unwrap();
        assert!(set.is_empty());
    }
}

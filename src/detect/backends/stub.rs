use std::collections::HashSet;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{finalize, Candidate};
use crate::detect::result::{BoundingBox, DetectionSet};
use crate::frame::Frame;
use crate::settings::Thresholds;

/// Scripted backend for testing.
///
/// Every call proposes the same candidates, which then go through the normal
/// threshold filtering. Frames listed with [`StubBackend::fail_on_frame`]
/// return an error instead. The thresholds of each call are recorded.
#[derive(Default)]
pub struct StubBackend {
    candidates: Vec<Candidate>,
    failing_frames: HashSet<u64>,
    seen: Vec<Thresholds>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose a box with the given score on every frame.
    pub fn with_box(mut self, bbox: BoundingBox, score: f32) -> Self {
        self.candidates.push(Candidate { bbox, score });
        self
    }

    /// Fail detection for the frame with this stream sequence number.
    pub fn fail_on_frame(mut self, sequence: u64) -> Self {
        self.failing_frames.insert(sequence);
        self
    }

    /// Thresholds received by each `detect` call, in call order.
    pub fn seen_thresholds(&self) -> &[Thresholds] {
        &self.seen
    }

    pub fn calls(&self) -> usize {
        self.seen.len()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<DetectionSet> {
        self.seen.push(*thresholds);
        if self.failing_frames.contains(&frame.sequence()) {
            return Err(anyhow!(
                "stub backend configured to fail on frame {}",
                frame.sequence()
            ));
        }
        Ok(finalize(
            self.candidates.clone(),
            thresholds,
            frame.width(),
            frame.height(),
        ))
    }
}

use anyhow::Result;

use crate::detect::render::{draw_detections, BoxStyle};
use crate::detect::result::DetectionSet;
use crate::frame::{AnnotatedFrame, Frame};
use crate::settings::Thresholds;

/// Detector backend trait.
///
/// `detect` must return detections that already honor `thresholds`: every
/// score is at least `thresholds.confidence`, overlaps above
/// `thresholds.iou` are suppressed and at most `thresholds.max_detections`
/// entries come back. Backends are expected to be deterministic for a given
/// frame and thresholds.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<DetectionSet>;

    /// Draw detections onto a copy of the frame.
    fn render(&self, frame: &Frame, detections: &DetectionSet, style: &BoxStyle) -> AnnotatedFrame {
        draw_detections(frame, detections, style)
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

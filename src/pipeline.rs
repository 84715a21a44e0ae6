//! Detection pipeline.
//!
//! Pulls one frame at a time from a [`FrameSource`], runs the detector on it,
//! draws the boxes and hands back a [`FrameResult`]. Nothing is read ahead:
//! the next frame is only fetched when the caller asks for the next result,
//! so a slow consumer slows the source down instead of losing frames.
//!
//! A detector failure is confined to its frame: that result carries the
//! error and an empty detection set, and the run goes on. Thresholds are
//! fixed when the pipeline is built.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::detect::{BoxStyle, DetectionSet, DetectorBackend};
use crate::error::{PotholeError, Result};
use crate::frame::{AnnotatedFrame, FrameOrigin};
use crate::ingest::{FrameSource, SourceRequest, StreamEnd};
use crate::settings::{DetectionSettings, Thresholds};

/// Cumulative counters for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    pub frames_processed: u64,
    pub total_detections: u64,
    /// Frames the source expected to produce, when known.
    pub expected_frames: Option<u64>,
    /// Frames whose detection call failed.
    pub failed_frames: u64,
}

impl RunMetrics {
    fn new(expected_frames: Option<u64>) -> Self {
        Self {
            expected_frames,
            ..Self::default()
        }
    }

    /// Progress in `[0, 1]` when the frame count is known.
    pub fn progress(&self) -> Option<f64> {
        self.expected_frames
            .filter(|&n| n > 0)
            .map(|n| (self.frames_processed as f64 / n as f64).min(1.0))
    }
}

/// One pipeline output unit.
#[derive(Debug)]
pub struct FrameResult {
    /// Zero-based position of the frame in this run.
    pub index: u64,
    pub annotated: AnnotatedFrame,
    pub detections: DetectionSet,
    /// Set when the detector failed on this frame.
    pub error: Option<PotholeError>,
    /// Counters including this frame.
    pub metrics: RunMetrics,
    /// Thresholds the detector was called with.
    pub thresholds: Thresholds,
    pub inference_time: Duration,
}

impl FrameResult {
    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Final account of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub origin: FrameOrigin,
    pub detector: &'static str,
    pub thresholds: Thresholds,
    pub metrics: RunMetrics,
    /// How the source stopped. `None` if the caller stopped pulling first.
    pub end: Option<StreamEnd>,
}

impl RunSummary {
    /// True when the source stopped short on its own: a failed read, or
    /// running dry before the frame count it promised. A caller that stops
    /// pulling or cancels does not count.
    pub fn ended_early(&self) -> bool {
        match self.end {
            Some(StreamEnd::ReadFailed { .. }) => true,
            Some(StreamEnd::Exhausted) => self
                .metrics
                .expected_frames
                .is_some_and(|n| self.metrics.frames_processed < n),
            Some(StreamEnd::Cancelled) | None => false,
        }
    }
}

/// Pull-based detection run over one frame source.
pub struct DetectionPipeline<'d> {
    source: FrameSource,
    detector: &'d mut dyn DetectorBackend,
    thresholds: Thresholds,
    style: BoxStyle,
    metrics: RunMetrics,
    done: bool,
}

impl<'d> DetectionPipeline<'d> {
    pub fn new(
        source: FrameSource,
        detector: &'d mut dyn DetectorBackend,
        thresholds: Thresholds,
        style: BoxStyle,
    ) -> Self {
        let metrics = RunMetrics::new(source.expected_frames());
        log::debug!(
            "pipeline: {} run with '{}' (confidence {}, iou {}, max {})",
            source.origin(),
            detector.name(),
            thresholds.confidence,
            thresholds.iou,
            thresholds.max_detections
        );
        Self {
            source,
            detector,
            thresholds,
            style,
            metrics,
            done: false,
        }
    }

    /// Open `request` and build a pipeline with thresholds snapshotted from
    /// `settings`. Fails before producing anything if the source cannot open.
    pub fn open(
        request: SourceRequest,
        detector: &'d mut dyn DetectorBackend,
        settings: &DetectionSettings,
    ) -> Result<Self> {
        let source = FrameSource::open(request)?;
        Ok(Self::new(
            source,
            detector,
            settings.thresholds(),
            BoxStyle::new(settings.box_color),
        ))
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn metrics(&self) -> RunMetrics {
        self.metrics
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            origin: self.source.origin(),
            detector: self.detector.name(),
            thresholds: self.thresholds,
            metrics: self.metrics,
            end: self.source.end(),
        }
    }

    /// Stop the run, release the source and return the summary.
    pub fn finish(self) -> RunSummary {
        let summary = self.summary();
        if summary.ended_early() {
            log::warn!(
                "pipeline: run ended early after {} of {} frames",
                summary.metrics.frames_processed,
                summary
                    .metrics
                    .expected_frames
                    .map_or_else(|| "?".to_string(), |n| n.to_string())
            );
        }
        summary
    }

    fn process_next(&mut self) -> Option<FrameResult> {
        let frame = self.source.next_frame()?;
        let index = self.metrics.frames_processed;

        let started = Instant::now();
        let outcome = self.detector.detect(&frame, &self.thresholds);
        let inference_time = started.elapsed();

        let (detections, error) = match outcome {
            Ok(detections) => (detections, None),
            Err(err) => {
                log::warn!("pipeline: detection failed on frame {}: {:#}", index, err);
                self.metrics.failed_frames += 1;
                (
                    DetectionSet::empty(),
                    Some(PotholeError::Detection {
                        frame_index: index,
                        message: format!("{err:#}"),
                    }),
                )
            }
        };

        self.metrics.frames_processed += 1;
        self.metrics.total_detections += detections.len() as u64;
        log::debug!(
            "pipeline: frame {} -> {} detections in {:?}",
            index,
            detections.len(),
            inference_time
        );

        let annotated = self.detector.render(&frame, &detections, &self.style);
        Some(FrameResult {
            index,
            annotated,
            detections,
            error,
            metrics: self.metrics,
            thresholds: self.thresholds,
            inference_time,
        })
    }
}

impl Iterator for DetectionPipeline<'_> {
    type Item = FrameResult;

    fn next(&mut self) -> Option<FrameResult> {
        if self.done {
            return None;
        }
        let result = self.process_next();
        if result.is_none() {
            self.done = true;
        }
        result
    }
}

/// Analyze one encoded image and return its single result.
pub fn analyze_image(
    bytes: Vec<u8>,
    detector: &mut dyn DetectorBackend,
    settings: &DetectionSettings,
) -> Result<FrameResult> {
    let mut pipeline = DetectionPipeline::open(SourceRequest::Image(bytes), detector, settings)?;
    match pipeline.next() {
        Some(result) => Ok(result),
        None => Err(PotholeError::Decode(anyhow::anyhow!(
            "image source produced no frame"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, StubBackend};

    fn video(locator: &str) -> FrameSource {
        FrameSource::open(SourceRequest::VideoPath(locator.into())).unwrap()
    }

    #[test]
    fn indices_increase_from_zero() {
        let mut backend = StubBackend::new();
        let pipeline = DetectionPipeline::new(
            video("stub://v?frames=5"),
            &mut backend,
            Thresholds::default(),
            BoxStyle::default(),
        );
        let indices: Vec<u64> = pipeline.map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn running_total_matches_per_frame_counts() {
        let mut backend = StubBackend::new()
            .with_box(BoundingBox::new(2.0, 2.0, 10.0, 10.0), 0.9)
            .with_box(BoundingBox::new(40.0, 40.0, 10.0, 10.0), 0.6);
        let mut pipeline = DetectionPipeline::new(
            video("stub://v?frames=4"),
            &mut backend,
            Thresholds::default(),
            BoxStyle::default(),
        );

        let mut sum = 0u64;
        for result in pipeline.by_ref() {
            sum += result.detection_count() as u64;
            assert_eq!(result.metrics.total_detections, sum);
            assert_eq!(result.metrics.frames_processed, result.index + 1);
        }
        let summary = pipeline.finish();
        assert_eq!(summary.metrics.total_detections, 8);
        assert_eq!(summary.metrics.frames_processed, 4);
        assert!(!summary.ended_early());
    }

    #[test]
    fn detection_failure_is_isolated_to_its_frame() {
        let mut backend = StubBackend::new()
            .with_box(BoundingBox::new(2.0, 2.0, 10.0, 10.0), 0.9)
            .fail_on_frame(1);
        let results: Vec<FrameResult> = DetectionPipeline::new(
            video("stub://v?frames=3"),
            &mut backend,
            Thresholds::default(),
            BoxStyle::default(),
        )
        .collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1].error,
            Some(PotholeError::Detection { frame_index: 1, .. })
        ));
        assert!(results[1].detections.is_empty());
        assert!(results[2].is_ok());
        assert_eq!(results[2].metrics.failed_frames, 1);
        assert_eq!(results[2].metrics.total_detections, 2);
    }

    #[test]
    fn pipeline_does_not_read_ahead() {
        let mut backend = StubBackend::new();
        let mut pipeline = DetectionPipeline::new(
            video("stub://v?frames=10"),
            &mut backend,
            Thresholds::default(),
            BoxStyle::default(),
        );
        let _first = pipeline.next().unwrap();
        let _second = pipeline.next().unwrap();
        let FrameSource::Video(source) = pipeline.source() else {
            panic!("expected video source");
        };
        assert_eq!(source.frames_read(), 2);
        drop(pipeline);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn stays_finished_after_end() {
        let mut backend = StubBackend::new();
        let mut pipeline = DetectionPipeline::new(
            video("stub://v?frames=1"),
            &mut backend,
            Thresholds::default(),
            BoxStyle::default(),
        );
        assert!(pipeline.next().is_some());
        assert!(pipeline.next().is_none());
        assert!(pipeline.next().is_none());
        assert_eq!(pipeline.summary().end, Some(StreamEnd::Exhausted));
    }

    #[test]
    fn caller_stopping_early_is_not_a_short_stream() {
        let mut backend = StubBackend::new();
        let mut pipeline = DetectionPipeline::new(
            video("stub://v?frames=10"),
            &mut backend,
            Thresholds::default(),
            BoxStyle::default(),
        );
        assert!(pipeline.next().is_some());
        assert!(pipeline.next().is_some());

        let summary = pipeline.finish();
        assert_eq!(summary.end, None);
        assert_eq!(summary.metrics.frames_processed, 2);
        assert!(!summary.ended_early());
    }

    #[test]
    fn exhausted_before_expected_count_is_short() {
        let summary = RunSummary {
            origin: FrameOrigin::VideoFrame,
            detector: "stub",
            thresholds: Thresholds::default(),
            metrics: RunMetrics {
                frames_processed: 8,
                expected_frames: Some(10),
                ..RunMetrics::default()
            },
            end: Some(StreamEnd::Exhausted),
        };
        assert!(summary.ended_early());

        let cancelled = RunSummary {
            end: Some(StreamEnd::Cancelled),
            ..summary.clone()
        };
        assert!(!cancelled.ended_early());
    }

    #[test]
    fn progress_tracks_expected_frames() {
        let metrics = RunMetrics {
            frames_processed: 5,
            expected_frames: Some(10),
            ..RunMetrics::default()
        };
        assert_eq!(metrics.progress(), Some(0.5));
        assert_eq!(RunMetrics::default().progress(), None);
    }
}

use std::io::{Cursor, Write};

use anyhow::Result as AnyResult;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use pothole_detect::detect::{CpuBackend, StubBackend};
use pothole_detect::{
    analyze_image, decode_png, BoundingBox, BoxColor, CameraConfig, CancelToken, DetectionMode,
    DetectionPipeline, DetectionSet, DetectionSettings, DetectorBackend, Frame, FrameOrigin,
    FrameResult, PotholeError, SourceRequest, StreamEnd, Thresholds,
};

fn road_with_hole(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if (20..44).contains(&x) && (16..40).contains(&y) {
            Rgb([12, 12, 12])
        } else {
            Rgb([175, 170, 165])
        }
    })
}

fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut buf, format)
        .expect("encode test image");
    buf.into_inner()
}

fn manual(confidence: f32) -> DetectionSettings {
    DetectionSettings::new(DetectionMode::Manual(confidence), BoxColor::RED).expect("settings")
}

fn stub_video(locator: &str) -> SourceRequest {
    SourceRequest::VideoPath(locator.into())
}

#[test]
fn video_read_failure_ends_run_with_partial_results() {
    let mut backend = StubBackend::new().with_box(BoundingBox::new(4.0, 4.0, 20.0, 20.0), 0.8);
    let mut pipeline = DetectionPipeline::open(
        stub_video("stub://video?frames=10&fail_at=7"),
        &mut backend,
        &DetectionSettings::default(),
    )
    .expect("open stub video");

    let results: Vec<FrameResult> = pipeline.by_ref().collect();
    let summary = pipeline.finish();

    assert_eq!(results.len(), 7);
    assert_eq!(summary.metrics.frames_processed, 7);
    assert_eq!(summary.metrics.expected_frames, Some(10));
    assert!(summary.ended_early());
    assert!(matches!(
        summary.end,
        Some(StreamEnd::ReadFailed { frame_index: 7, .. })
    ));
}

#[test]
fn thresholds_are_fixed_at_run_start() {
    let mut backend = StubBackend::new().with_box(BoundingBox::new(4.0, 4.0, 20.0, 20.0), 0.5);
    let mut settings = manual(0.4);

    let mut pipeline =
        DetectionPipeline::open(stub_video("stub://video?frames=5"), &mut backend, &settings)
            .expect("open first run");
    let first = pipeline.next().expect("first frame");
    settings.set_mode(DetectionMode::Manual(0.9)).unwrap();
    let rest: Vec<FrameResult> = pipeline.collect();

    assert_eq!(first.thresholds.confidence, 0.4);
    assert_eq!(first.detection_count(), 1);
    assert!(rest.iter().all(|r| r.thresholds.confidence == 0.4));
    assert!(rest.iter().all(|r| r.detection_count() == 1));
    assert!(backend.seen_thresholds().iter().all(|t| t.confidence == 0.4));
    assert_eq!(backend.calls(), 5);

    let second: Vec<FrameResult> =
        DetectionPipeline::open(stub_video("stub://video?frames=2"), &mut backend, &settings)
            .expect("open second run")
            .collect();
    assert!(second.iter().all(|r| r.thresholds.confidence == 0.9));
    assert!(second.iter().all(|r| r.detections.is_empty()));
}

/// Cancels the run from inside the detector, i.e. while a frame is in flight.
struct CancellingBackend {
    cancel: CancelToken,
    cancel_on: u64,
}

impl DetectorBackend for CancellingBackend {
    fn name(&self) -> &'static str {
        "cancelling"
    }

    fn detect(&mut self, frame: &Frame, _thresholds: &Thresholds) -> AnyResult<DetectionSet> {
        if frame.sequence() == self.cancel_on {
            self.cancel.cancel();
        }
        Ok(DetectionSet::empty())
    }
}

#[test]
fn camera_stop_finishes_in_flight_frame() {
    let cancel = CancelToken::new();
    let mut backend = CancellingBackend {
        cancel: cancel.clone(),
        cancel_on: 2,
    };
    let request = SourceRequest::Camera {
        config: CameraConfig {
            device: "stub://camera".to_string(),
            ..CameraConfig::default()
        },
        cancel,
    };
    let mut pipeline =
        DetectionPipeline::open(request, &mut backend, &DetectionSettings::default()).unwrap();

    let indices: Vec<u64> = pipeline.by_ref().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(!pipeline.source().is_open());

    let summary = pipeline.finish();
    assert_eq!(summary.end, Some(StreamEnd::Cancelled));
    assert_eq!(summary.metrics.expected_frames, None);
    assert!(!summary.ended_early());
}

#[test]
fn unopenable_video_fails_before_any_result() {
    let mut backend = StubBackend::new();
    let err = DetectionPipeline::open(
        stub_video("/definitely/not/here.mp4"),
        &mut backend,
        &DetectionSettings::default(),
    )
    .err()
    .expect("open must fail");

    assert!(matches!(
        err,
        PotholeError::SourceOpen {
            origin: FrameOrigin::VideoFrame,
            ..
        }
    ));
    assert!(err.is_fatal());
    assert_eq!(backend.calls(), 0);
}

#[test]
fn uploaded_video_bytes_are_persisted_and_cleaned_up() {
    let mut backend = StubBackend::new();
    let request = SourceRequest::VideoBytes {
        bytes: b"stub://upload?frames=3".to_vec(),
        extension: Some("mp4".to_string()),
    };
    let mut pipeline =
        DetectionPipeline::open(request, &mut backend, &DetectionSettings::default()).unwrap();
    let temp_path = match pipeline.source() {
        pothole_detect::FrameSource::Video(video) => video.temp_path().expect("temp file"),
        _ => panic!("expected a video source"),
    };
    assert!(temp_path.exists());

    assert_eq!(pipeline.by_ref().count(), 3);
    let summary = pipeline.finish();
    assert_eq!(summary.end, Some(StreamEnd::Exhausted));
    assert!(!temp_path.exists());
}

#[test]
fn still_images_produce_exactly_one_result() {
    let image = road_with_hole(64, 64);
    for format in [ImageFormat::Png, ImageFormat::Jpeg] {
        let mut backend = CpuBackend::new();
        let mut pipeline = DetectionPipeline::open(
            SourceRequest::Image(encode(&image, format)),
            &mut backend,
            &DetectionSettings::default(),
        )
        .unwrap();

        let first = pipeline.next().expect("one result");
        assert!(pipeline.next().is_none());
        assert_eq!(first.index, 0);
        assert_eq!(first.annotated.origin(), FrameOrigin::SingleImage);
        assert_eq!(first.detection_count(), 1, "{format:?}");
        assert_eq!(pipeline.finish().metrics.frames_processed, 1);
    }
}

#[test]
fn camera_snapshot_is_a_single_camera_frame() {
    let bytes = encode(&road_with_hole(48, 48), ImageFormat::Png);
    let mut backend = StubBackend::new();
    let results: Vec<FrameResult> = DetectionPipeline::open(
        SourceRequest::CameraSnapshot(bytes),
        &mut backend,
        &DetectionSettings::default(),
    )
    .unwrap()
    .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].annotated.origin(), FrameOrigin::CameraCapture);
}

#[test]
fn corrupt_image_is_a_decode_error() {
    let mut backend = StubBackend::new();
    let err = analyze_image(
        b"\x89PNG but not really".to_vec(),
        &mut backend,
        &DetectionSettings::default(),
    )
    .err()
    .expect("decode must fail");
    assert!(matches!(err, PotholeError::Decode(_)));
}

#[test]
fn total_detections_is_the_sum_of_frames() {
    let mut backend = StubBackend::new()
        .with_box(BoundingBox::new(0.0, 0.0, 30.0, 30.0), 0.9)
        .with_box(BoundingBox::new(80.0, 60.0, 30.0, 30.0), 0.3)
        .fail_on_frame(3);
    let mut pipeline = DetectionPipeline::open(
        stub_video("stub://video?frames=6"),
        &mut backend,
        &DetectionSettings::default(),
    )
    .unwrap();

    let per_frame: u64 = pipeline
        .by_ref()
        .map(|r| r.detection_count() as u64)
        .sum();
    let summary = pipeline.finish();
    assert_eq!(summary.metrics.total_detections, per_frame);
    assert_eq!(summary.metrics.total_detections, 10);
    assert_eq!(summary.metrics.failed_frames, 1);
}

#[test]
fn annotated_png_download_round_trips() {
    let bytes = encode(&road_with_hole(64, 48), ImageFormat::Png);
    let settings = DetectionSettings::new(DetectionMode::Auto, BoxColor([0, 255, 0])).unwrap();
    let result = analyze_image(bytes, &mut CpuBackend::new(), &settings).unwrap();

    let png = result.annotated.to_png().unwrap();
    let decoded = decode_png(&png).unwrap();
    assert_eq!(decoded.as_raw(), result.annotated.image().as_raw());

    let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    file.write_all(&png).unwrap();
    let reread = image::open(file.path()).unwrap().to_rgb8();
    assert_eq!(reread.dimensions(), (64, 48));
    assert!(reread.pixels().any(|p| *p == Rgb([0, 255, 0])));
}

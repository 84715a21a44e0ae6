//! Pothole detection over still images, video files and live cameras.
//!
//! # Architecture
//!
//! A run is a pull loop: a [`FrameSource`] yields one decoded [`Frame`] at a
//! time, the [`DetectionPipeline`] hands it to a [`DetectorBackend`] with the
//! thresholds snapshotted at run start, draws the boxes and returns a
//! [`FrameResult`]. Nothing is buffered between stages.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames and annotated output frames (PNG encode/decode)
//! - `ingest`: frame sources (still image, video file, live camera)
//! - `detect`: detector trait, backends, box post-processing and rendering
//! - `pipeline`: the per-frame loop and run metrics
//! - `settings`: detection mode, thresholds and box color
//! - `config`: JSON config file plus environment overrides
//! - `cancel`: cooperative stop flag for camera runs

pub mod cancel;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod settings;

pub use cancel::CancelToken;
pub use config::{BackendChoice, ModeChoice, ModelSettings, PotholeConfig};
pub use detect::{
    load_backend, shared_detector, BoundingBox, BoxStyle, Detection, DetectionSet,
    DetectorBackend, SharedDetector,
};
pub use error::{PotholeError, Result};
pub use frame::{decode_png, AnnotatedFrame, Frame, FrameOrigin, DOWNLOAD_FILE_NAME};
pub use ingest::{CameraConfig, FrameSource, SourceRequest, StreamEnd};
pub use pipeline::{analyze_image, DetectionPipeline, FrameResult, RunMetrics, RunSummary};
pub use settings::{BoxColor, DetectionMode, DetectionSettings, Thresholds};

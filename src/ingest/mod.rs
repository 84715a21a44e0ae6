//! Frame sources.
//!
//! One contract, `next_frame() -> Option<Frame>`, over three origins:
//! - a single still (uploaded image or camera snapshot): exactly one frame
//! - a video file: frames in file order until end of stream or a failed read
//!   (local files need feature: ingest-file-ffmpeg)
//! - a live camera: frames until the run is cancelled or a read fails
//!   (device nodes need feature: ingest-v4l2)
//!
//! `stub://` locators give synthetic video and camera streams for testing.
//!
//! Video and camera sources own their handle exclusively and release it
//! exactly once, whichever way the stream ends (including being dropped
//! early). Failing to acquire a handle is a `SourceOpen` error at open time,
//! never an empty stream.

mod camera;
#[cfg(feature = "ingest-v4l2")]
mod camera_v4l2;
mod still;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
mod video;
#[cfg(feature = "ingest-file-ffmpeg")]
mod video_ffmpeg;

use std::path::PathBuf;

use serde::Serialize;

pub use camera::{CameraConfig, CameraSource};
pub use still::ImageSource;
pub use video::VideoSource;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::frame::{Frame, FrameOrigin};

/// Why a stream stopped producing frames.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StreamEnd {
    /// The source ran out of frames.
    Exhausted,
    /// Reading or decoding frame `frame_index` failed; nothing after it was read.
    ReadFailed { frame_index: u64, message: String },
    /// The caller stopped the run.
    Cancelled,
}

/// What the user asked to analyze.
pub enum SourceRequest {
    /// Encoded still image (PNG or JPEG).
    Image(Vec<u8>),
    /// Encoded still captured by a camera widget.
    CameraSnapshot(Vec<u8>),
    /// Uploaded video bytes plus an optional container extension hint.
    VideoBytes {
        bytes: Vec<u8>,
        extension: Option<String>,
    },
    /// Video already on disk, or a `stub://` locator.
    VideoPath(PathBuf),
    /// Live camera.
    Camera {
        config: CameraConfig,
        cancel: CancelToken,
    },
}

/// A frame source of any origin.
pub enum FrameSource {
    Image(ImageSource),
    Video(VideoSource),
    Camera(CameraSource),
}

impl FrameSource {
    pub fn open(request: SourceRequest) -> Result<Self> {
        match request {
            SourceRequest::Image(bytes) => Ok(Self::Image(ImageSource::from_bytes(&bytes)?)),
            SourceRequest::CameraSnapshot(bytes) => {
                Ok(Self::Image(ImageSource::from_camera_snapshot(&bytes)?))
            }
            SourceRequest::VideoBytes { bytes, extension } => Ok(Self::Video(
                VideoSource::from_bytes(&bytes, extension.as_deref())?,
            )),
            SourceRequest::VideoPath(path) => Ok(Self::Video(VideoSource::open(&path)?)),
            SourceRequest::Camera { config, cancel } => {
                Ok(Self::Camera(CameraSource::open(&config, cancel)?))
            }
        }
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        match self {
            FrameSource::Image(source) => source.next_frame(),
            FrameSource::Video(source) => source.next_frame(),
            FrameSource::Camera(source) => source.next_frame(),
        }
    }

    pub fn origin(&self) -> FrameOrigin {
        match self {
            FrameSource::Image(source) => source.origin(),
            FrameSource::Video(_) => FrameOrigin::VideoFrame,
            FrameSource::Camera(_) => FrameOrigin::CameraCapture,
        }
    }

    /// Frames the source expects to produce, when known up front.
    pub fn expected_frames(&self) -> Option<u64> {
        match self {
            FrameSource::Image(_) => Some(1),
            FrameSource::Video(source) => source.expected_frames(),
            FrameSource::Camera(_) => None,
        }
    }

    /// Why the stream ended. `None` while it is still producing.
    pub fn end(&self) -> Option<StreamEnd> {
        match self {
            FrameSource::Image(source) => source.is_consumed().then_some(StreamEnd::Exhausted),
            FrameSource::Video(source) => source.end().cloned(),
            FrameSource::Camera(source) => source.end().cloned(),
        }
    }

    /// True while a video/camera handle is held.
    pub fn is_open(&self) -> bool {
        match self {
            FrameSource::Image(_) => false,
            FrameSource::Video(source) => source.is_open(),
            FrameSource::Camera(source) => source.is_open(),
        }
    }
}

impl Iterator for FrameSource {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.next_frame()
    }
}

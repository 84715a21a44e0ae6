//! Still-image frame source.
//!
//! Wraps one decoded image, either an uploaded file or a single camera
//! snapshot. Yields exactly one frame and holds no handle.

use crate::error::Result;
use crate::frame::{Frame, FrameOrigin};

pub struct ImageSource {
    frame: Option<Frame>,
    origin: FrameOrigin,
}

impl ImageSource {
    pub fn new(frame: Frame) -> Self {
        Self {
            origin: frame.origin(),
            frame: Some(frame),
        }
    }

    /// Decode an uploaded image (PNG or JPEG).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(Frame::decode(bytes, FrameOrigin::SingleImage)?))
    }

    /// Decode a single still captured by a camera widget.
    pub fn from_camera_snapshot(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(Frame::decode(bytes, FrameOrigin::CameraCapture)?))
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        self.frame.take()
    }

    pub fn origin(&self) -> FrameOrigin {
        self.origin
    }

    pub fn is_consumed(&self) -> bool {
        self.frame.is_none()
    }
}

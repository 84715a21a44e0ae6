//! Error taxonomy for detection runs.
//!
//! Only `SourceOpen` is fatal to a run. `Detection` is isolated to the frame
//! that produced it and travels inside that frame's result. A decode failure
//! in the middle of a video is not an error at all: it ends the stream and is
//! reported through [`crate::ingest::StreamEnd`].

use thiserror::Error;

use crate::frame::FrameOrigin;

pub type Result<T, E = PotholeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PotholeError {
    /// The video file or camera device could not be acquired.
    #[error("failed to open {origin} source '{locator}'")]
    SourceOpen {
        origin: FrameOrigin,
        locator: String,
        #[source]
        source: anyhow::Error,
    },

    /// A still image could not be decoded.
    #[error("failed to decode image")]
    Decode(#[source] anyhow::Error),

    /// The detector failed on one frame.
    #[error("detection failed on frame {frame_index}: {message}")]
    Detection { frame_index: u64, message: String },

    /// Re-encoding an annotated frame for download failed.
    #[error("failed to encode annotated frame as PNG")]
    Encode(#[source] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PotholeError {
    pub(crate) fn source_open(
        origin: FrameOrigin,
        locator: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::SourceOpen {
            origin,
            locator: locator.into(),
            source,
        }
    }

    /// True for errors that stop a run before any frame is produced.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Detection { .. })
    }
}

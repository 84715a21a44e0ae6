//! Live camera frame source.
//!
//! Captures frames while the run's [`CancelToken`] says to keep running. The
//! token is checked once per frame before capture; a read failure also ends
//! the stream. Either way the device is released exactly once, and dropping
//! the source releases it too.
//!
//! Backends:
//! - `stub://` device paths produce synthetic frames
//! - anything else is a V4L2 device node (feature: ingest-v4l2)

use anyhow::anyhow;

#[cfg(feature = "ingest-v4l2")]
use super::camera_v4l2::V4l2Camera;
use super::synthetic::{is_stub_locator, SyntheticFrames, SyntheticSpec};
use super::StreamEnd;
use crate::cancel::CancelToken;
use crate::error::{PotholeError, Result};
use crate::frame::{Frame, FrameOrigin};

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://` locator.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Requested frame rate. The driver may ignore it.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

pub struct CameraSource {
    device: String,
    handle: Option<CameraBackend>,
    cancel: CancelToken,
    produced: u64,
    end: Option<StreamEnd>,
}

enum CameraBackend {
    Synthetic(SyntheticFrames),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Camera),
    /// Synthetic device whose lease shows when the handle is dropped.
    #[cfg(test)]
    Leased(SyntheticFrames, std::sync::Arc<()>),
}

impl CameraBackend {
    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        match self {
            CameraBackend::Synthetic(frames) => frames.read(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.read().map(Some),
            #[cfg(test)]
            CameraBackend::Leased(frames, _) => frames.read(),
        }
    }
}

impl CameraSource {
    pub fn open(config: &CameraConfig, cancel: CancelToken) -> Result<Self> {
        let backend = open_backend(config).map_err(|err| {
            PotholeError::source_open(FrameOrigin::CameraCapture, &config.device, err)
        })?;
        log::info!("CameraSource: opened {}", config.device);
        Ok(Self {
            device: config.device.clone(),
            handle: Some(backend),
            cancel,
            produced: 0,
            end: None,
        })
    }

    /// Capture the next frame unless the run was cancelled.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.handle.is_none() {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finish(StreamEnd::Cancelled);
            return None;
        }
        let handle = self.handle.as_mut()?;
        match handle.read() {
            Ok(Some(frame)) => {
                self.produced += 1;
                Some(frame)
            }
            Ok(None) => {
                self.finish(StreamEnd::Exhausted);
                None
            }
            Err(err) => {
                log::warn!(
                    "CameraSource: capture failed on {} after {} frames: {:#}",
                    self.device,
                    self.produced,
                    err
                );
                self.finish(StreamEnd::ReadFailed {
                    frame_index: self.produced,
                    message: format!("{err:#}"),
                });
                None
            }
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.produced
    }

    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn finish(&mut self, end: StreamEnd) {
        self.end = Some(end);
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle);
            log::info!(
                "CameraSource: released {} after {} frames",
                self.device,
                self.produced
            );
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_backend(config: &CameraConfig) -> anyhow::Result<CameraBackend> {
    if is_stub_locator(&config.device) {
        let spec = SyntheticSpec::parse(&config.device)?;
        return Ok(CameraBackend::Synthetic(SyntheticFrames::new(
            spec,
            FrameOrigin::CameraCapture,
        )));
    }
    if config.width == 0 || config.height == 0 {
        return Err(anyhow!("camera dimensions must be non-zero"));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(CameraBackend::Device(V4l2Camera::open(config)?))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow!("camera capture requires the ingest-v4l2 feature"))
    }
}

//! Video file frame source.
//!
//! Frames come out in file order until end of stream or the first read that
//! fails. A failed read is not an error for the caller: the stream just ends
//! and [`VideoSource::end`] says why, so a short run is visible.
//!
//! Uploaded bytes are persisted to a temporary file first because the decoder
//! only opens paths. The temporary file belongs to the open handle and is
//! deleted when the handle is released.
//!
//! Backends:
//! - `stub://` locators (or files whose content is a stub locator) produce
//!   synthetic frames
//! - anything else is decoded with FFmpeg (feature: ingest-file-ffmpeg)

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tempfile::NamedTempFile;

use super::synthetic::{is_stub_locator, SyntheticFrames, SyntheticSpec, STUB_SCHEME};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::video_ffmpeg::FfmpegVideo;
use super::StreamEnd;
use crate::error::{PotholeError, Result};
use crate::frame::{Frame, FrameOrigin};

pub struct VideoSource {
    locator: String,
    handle: Option<VideoHandle>,
    expected: Option<u64>,
    produced: u64,
    end: Option<StreamEnd>,
}

struct VideoHandle {
    backend: VideoBackend,
    /// Kept alive for as long as the decoder reads from it.
    temp_file: Option<NamedTempFile>,
}

enum VideoBackend {
    Synthetic(SyntheticFrames),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegVideo),
}

impl VideoBackend {
    fn total_frames(&self) -> Option<u64> {
        match self {
            VideoBackend::Synthetic(frames) => frames.total(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(video) => video.total_frames(),
        }
    }

    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        match self {
            VideoBackend::Synthetic(frames) => frames.read(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(video) => video.read(),
        }
    }
}

impl VideoSource {
    /// Open a video by path or `stub://` locator.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let locator = path.display().to_string();
        let backend = open_backend(path)
            .map_err(|err| PotholeError::source_open(FrameOrigin::VideoFrame, &locator, err))?;
        Ok(Self::with_handle(
            locator,
            VideoHandle {
                backend,
                temp_file: None,
            },
        ))
    }

    /// Persist uploaded bytes to a temporary file and open it.
    ///
    /// `extension` is a hint for the container demuxer (e.g. "mp4").
    pub fn from_bytes(bytes: &[u8], extension: Option<&str>) -> Result<Self> {
        let temp_file = persist_upload(bytes, extension)
            .map_err(|err| PotholeError::source_open(FrameOrigin::VideoFrame, "<upload>", err))?;
        let locator = temp_file.path().display().to_string();
        let backend = open_backend(temp_file.path())
            .map_err(|err| PotholeError::source_open(FrameOrigin::VideoFrame, &locator, err))?;
        Ok(Self::with_handle(
            locator,
            VideoHandle {
                backend,
                temp_file: Some(temp_file),
            },
        ))
    }

    fn with_handle(locator: String, handle: VideoHandle) -> Self {
        let expected = handle.backend.total_frames();
        log::info!(
            "VideoSource: opened {} ({} frames)",
            locator,
            expected.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );
        Self {
            locator,
            handle: Some(handle),
            expected,
            produced: 0,
            end: None,
        }
    }

    /// Next frame in file order, `None` once the stream has ended.
    pub fn next_frame(&mut self) -> Option<Frame> {
        let handle = self.handle.as_mut()?;
        match handle.backend.read() {
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
                    "VideoSource: read failed at frame {} of {}: {:#}",
                    self.produced,
                    self.locator,
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

    /// Frame count reported by the container, if any.
    pub fn expected_frames(&self) -> Option<u64> {
        self.expected
    }

    pub fn frames_read(&self) -> u64 {
        self.produced
    }

    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Path of the temporary copy of an upload while the handle is open.
    pub fn temp_path(&self) -> Option<PathBuf> {
        self.handle
            .as_ref()
            .and_then(|h| h.temp_file.as_ref())
            .map(|f| f.path().to_path_buf())
    }

    /// Stop reading early. Safe to call more than once.
    pub fn close(&mut self) {
        if self.end.is_none() && self.handle.is_some() {
            self.finish(StreamEnd::Cancelled);
        }
    }

    fn finish(&mut self, end: StreamEnd) {
        self.end = Some(end);
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle);
            log::info!(
                "VideoSource: released {} after {} frames",
                self.locator,
                self.produced
            );
        }
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn persist_upload(bytes: &[u8], extension: Option<&str>) -> anyhow::Result<NamedTempFile> {
    let suffix = extension
        .map(|ext| format!(".{}", ext.trim_start_matches('.')))
        .unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix("pothole-upload-")
        .suffix(&suffix)
        .tempfile()
        .context("create temporary video file")?;
    file.write_all(bytes).context("write temporary video file")?;
    file.flush().context("flush temporary video file")?;
    Ok(file)
}

/// Only UTF-8 paths can be locators; any other path goes straight to the file.
fn open_backend(path: &Path) -> anyhow::Result<VideoBackend> {
    if path.as_os_str().is_empty() {
        return Err(anyhow!("empty video locator"));
    }
    if let Some(locator) = path.to_str() {
        if locator.trim().is_empty() {
            return Err(anyhow!("empty video locator"));
        }
        if is_stub_locator(locator) {
            let spec = SyntheticSpec::parse(locator)?;
            return Ok(VideoBackend::Synthetic(SyntheticFrames::new(
                spec,
                FrameOrigin::VideoFrame,
            )));
        }
        if locator.contains("://") {
            return Err(anyhow!("video input only supports local paths (no URL schemes)"));
        }
    }

    if let Some(stub) = read_stub_file(path)? {
        let spec = SyntheticSpec::parse(&stub)?;
        return Ok(VideoBackend::Synthetic(SyntheticFrames::new(
            spec,
            FrameOrigin::VideoFrame,
        )));
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        Ok(VideoBackend::Ffmpeg(FfmpegVideo::open(path)?))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(anyhow!(
            "video decoding requires the ingest-file-ffmpeg feature"
        ))
    }
}

/// A file whose whole content is a `stub://` locator stands in for a video.
fn read_stub_file(path: &Path) -> anyhow::Result<Option<String>> {
    let mut file =
        File::open(path).with_context(|| format!("open video file {}", path.display()))?;
    let mut head = [0u8; STUB_SCHEME.len()];
    if file.read_exact(&mut head).is_err() || head != *STUB_SCHEME.as_bytes() {
        return Ok(None);
    }
    let mut rest = String::new();
    file.read_to_string(&mut rest)
        .with_context(|| format!("read stub video {}", path.display()))?;
    Ok(Some(format!("{STUB_SCHEME}{}", rest.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_frames_in_order_then_ends() {
        let mut source = VideoSource::open("stub://clip?frames=4").unwrap();
        assert_eq!(source.expected_frames(), Some(4));

        let seqs: Vec<u64> = std::iter::from_fn(|| source.next_frame())
            .map(|f| f.sequence())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert_eq!(source.end(), Some(&StreamEnd::Exhausted));
        assert!(!source.is_open());
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn read_failure_ends_stream_early() {
        let mut source = VideoSource::open("stub://clip?frames=10&fail_at=7").unwrap();
        let count = std::iter::from_fn(|| source.next_frame()).count();
        assert_eq!(count, 7);
        assert!(matches!(
            source.end(),
            Some(StreamEnd::ReadFailed { frame_index: 7, .. })
        ));
        assert!(!source.is_open());
    }

    #[test]
    fn missing_file_is_source_open_error() {
        let err = VideoSource::open("/nonexistent/pothole.mp4").err().unwrap();
        assert!(matches!(
            err,
            PotholeError::SourceOpen {
                origin: FrameOrigin::VideoFrame,
                ..
            }
        ));
    }

    #[test]
    fn url_locators_are_rejected() {
        assert!(VideoSource::open("http://example.com/a.mp4").is_err());
    }

    #[test]
    fn upload_temp_file_is_removed_on_release() {
        let mut source = VideoSource::from_bytes(b"stub://upload?frames=2", Some("mp4")).unwrap();
        let temp = source.temp_path().expect("temp file while open");
        assert!(temp.exists());
        assert_eq!(temp.extension().and_then(|e| e.to_str()), Some("mp4"));

        while source.next_frame().is_some() {}
        assert!(!temp.exists());
        assert_eq!(source.frames_read(), 2);
    }

    #[test]
    fn dropping_open_source_removes_temp_file() {
        let source = VideoSource::from_bytes(b"stub://upload?frames=5", None).unwrap();
        let temp = source.temp_path().unwrap();
        drop(source);
        assert!(!temp.exists());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_opens_that_exact_file() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"clip-\xff.mp4"));
        std::fs::write(&path, "stub://clip?frames=2").unwrap();
        // a lossy conversion would point here instead
        let lossy = dir.path().join("clip-\u{FFFD}.mp4");
        std::fs::write(&lossy, "stub://clip?frames=5").unwrap();

        let mut source = VideoSource::open(&path).unwrap();
        assert_eq!(source.expected_frames(), Some(2));
        assert_eq!(std::iter::from_fn(|| source.next_frame()).count(), 2);
    }

    #[test]
    fn close_marks_cancelled_once() {
        let mut source = VideoSource::open("stub://clip?frames=3").unwrap();
        source.next_frame();
        source.close();
        source.close();
        assert_eq!(source.end(), Some(&StreamEnd::Cancelled));
        assert!(source.next_frame().is_none());
    }
}

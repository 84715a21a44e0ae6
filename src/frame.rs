//! Frames and annotated frames.
//!
//! - `Frame`: one decoded RGB raster tagged with where it came from. Pixels are
//!   private and there is no mutable accessor, so a frame cannot change after
//!   the source hands it out.
//! - `AnnotatedFrame`: a copy of a frame with detection boxes drawn on it.
//!   Also immutable; the only thing it can do is hand out pixels or re-encode
//!   itself as PNG for download.

use std::fmt;
use std::io::Cursor;

use anyhow::{anyhow, Context};
use image::{DynamicImage, ImageFormat, RgbImage};
use serde::Serialize;

use crate::error::{PotholeError, Result};

/// File name offered for a downloaded annotated frame.
pub const DOWNLOAD_FILE_NAME: &str = "pothole_result.png";

/// Where a frame came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrigin {
    SingleImage,
    VideoFrame,
    CameraCapture,
}

impl fmt::Display for FrameOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameOrigin::SingleImage => "image",
            FrameOrigin::VideoFrame => "video",
            FrameOrigin::CameraCapture => "camera",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A single decoded image to analyze.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    origin: FrameOrigin,
    /// Position in the source stream (0 for stills).
    sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, origin: FrameOrigin, sequence: u64) -> Self {
        Self {
            image,
            origin,
            sequence,
        }
    }

    /// Build a frame from a packed RGB24 buffer.
    pub fn from_rgb(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        origin: FrameOrigin,
        sequence: u64,
    ) -> anyhow::Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, origin, sequence))
    }

    /// Decode an encoded still (PNG, JPEG) into a frame.
    pub fn decode(bytes: &[u8], origin: FrameOrigin) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .context("unrecognized or corrupt image data")
            .map_err(PotholeError::Decode)?;
        Ok(Self::new(image.to_rgb8(), origin, 0))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn origin(&self) -> FrameOrigin {
        self.origin
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

// ----------------------------------------------------------------------------
// AnnotatedFrame
// ----------------------------------------------------------------------------

/// A frame with detections composited onto a copy of its pixels.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    image: RgbImage,
    origin: FrameOrigin,
}

impl AnnotatedFrame {
    pub(crate) fn new(image: RgbImage, origin: FrameOrigin) -> Self {
        Self { image, origin }
    }

    /// Annotated copy with nothing drawn on it.
    pub fn unmarked(frame: &Frame) -> Self {
        Self::new(frame.image().clone(), frame.origin())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn origin(&self) -> FrameOrigin {
        self.origin
    }

    /// Re-encode as PNG for download.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.image)
    }
}

pub(crate) fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PotholeError::Encode(anyhow!(
            "cannot encode image with zero dimensions"
        )));
    }
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut buf, ImageFormat::Png)
        .context("PNG encoder rejected frame")
        .map_err(PotholeError::Encode)?;
    Ok(buf.into_inner())
}

/// Decode PNG bytes produced by [`AnnotatedFrame::to_png`].
pub fn decode_png(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .context("invalid PNG data")
        .map_err(PotholeError::Decode)?;
    Ok(image.to_rgb8())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn from_rgb_validates_length() {
        let err = Frame::from_rgb(vec![0u8; 10], 2, 2, FrameOrigin::VideoFrame, 0);
        assert!(err.is_err());

        let frame = Frame::from_rgb(vec![9u8; 12], 2, 2, FrameOrigin::VideoFrame, 3).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.sequence(), 3);
    }

    #[test]
    fn png_round_trip_is_pixel_identical() {
        let frame = Frame::new(gradient(37, 23), FrameOrigin::SingleImage, 0);
        let annotated = AnnotatedFrame::unmarked(&frame);

        let bytes = annotated.to_png().unwrap();
        let decoded = decode_png(&bytes).unwrap();

        assert_eq!(decoded.dimensions(), (37, 23));
        assert_eq!(decoded.as_raw(), annotated.image().as_raw());
    }

    #[test]
    fn encoding_empty_image_is_an_encode_error() {
        let annotated = AnnotatedFrame::new(RgbImage::new(0, 0), FrameOrigin::SingleImage);
        assert!(matches!(annotated.to_png(), Err(PotholeError::Encode(_))));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = Frame::decode(b"definitely not an image", FrameOrigin::SingleImage);
        assert!(matches!(err, Err(PotholeError::Decode(_))));
    }
}

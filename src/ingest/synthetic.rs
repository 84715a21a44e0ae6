//! Synthetic frames for `stub://` locators.
//!
//! `stub://<name>?frames=10&fail_at=7&width=64&height=48`
//!
//! - `frames`: number of decodable frames (unbounded when absent)
//! - `fail_at`: zero-based index whose read fails
//! - `width` / `height`: frame size (defaults 160x120)
//!
//! Each frame is a light gray road with one dark square that drifts right by
//! a few pixels per frame.

use anyhow::{anyhow, bail, Result};
use image::{Rgb, RgbImage};

use crate::frame::{Frame, FrameOrigin};

pub(crate) const STUB_SCHEME: &str = "stub://";

const DEFAULT_WIDTH: u32 = 160;
const DEFAULT_HEIGHT: u32 = 120;

pub(crate) fn is_stub_locator(locator: &str) -> bool {
    locator.trim_start().starts_with(STUB_SCHEME)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SyntheticSpec {
    pub frames: Option<u64>,
    pub fail_at: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl SyntheticSpec {
    pub(crate) fn parse(locator: &str) -> Result<Self> {
        let rest = locator
            .trim()
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| anyhow!("not a stub locator: '{}'", locator))?;
        let mut spec = SyntheticSpec {
            frames: None,
            fail_at: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        };
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(spec);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub parameter '{}' has no value", pair))?;
            let parsed: u64 = value
                .parse()
                .map_err(|_| anyhow!("stub parameter '{}' must be an integer", key))?;
            match key {
                "frames" => spec.frames = Some(parsed),
                "fail_at" => spec.fail_at = Some(parsed),
                "width" => spec.width = u32::try_from(parsed)?,
                "height" => spec.height = u32::try_from(parsed)?,
                other => bail!("unknown stub parameter '{}'", other),
            }
        }
        if spec.width == 0 || spec.height == 0 {
            bail!("stub frames must have non-zero dimensions");
        }
        Ok(spec)
    }
}

/// Frame generator behind every synthetic handle.
pub(crate) struct SyntheticFrames {
    spec: SyntheticSpec,
    origin: FrameOrigin,
    produced: u64,
}

impl SyntheticFrames {
    pub(crate) fn new(spec: SyntheticSpec, origin: FrameOrigin) -> Self {
        Self {
            spec,
            origin,
            produced: 0,
        }
    }

    pub(crate) fn total(&self) -> Option<u64> {
        self.spec.frames
    }

    /// `Ok(None)` at end of stream, `Err` for the configured failing read.
    pub(crate) fn read(&mut self) -> Result<Option<Frame>> {
        let index = self.produced;
        if self.spec.fail_at == Some(index) {
            bail!("synthetic read failure at frame {}", index);
        }
        if self.spec.frames.is_some_and(|total| index >= total) {
            return Ok(None);
        }
        self.produced += 1;
        Ok(Some(Frame::new(self.render(index), self.origin, index)))
    }

    fn render(&self, index: u64) -> RgbImage {
        let (w, h) = (self.spec.width, self.spec.height);
        let side = (w.min(h) / 4).max(1);
        let span = w.saturating_sub(side).max(1) as u64;
        let x0 = ((index * 3) % span) as u32;
        let y0 = (h - side) / 2;
        RgbImage::from_fn(w, h, |x, y| {
            if x >= x0 && x < x0 + side && y >= y0 && y < y0 + side {
                Rgb([25, 22, 20])
            } else {
                Rgb([170, 170, 165])
            }
        })
    }
}

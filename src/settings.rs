//! Run settings chosen before a run starts.
//!
//! `DetectionSettings` is what the presentation layer edits. A run never reads
//! it directly: it takes a `Thresholds` snapshot at start, so later edits only
//! affect the next run.

use std::fmt;
use std::str::FromStr;

use image::Rgb;
use serde::Serialize;

use crate::error::{PotholeError, Result};

/// Confidence used in Auto mode.
pub const AUTO_CONFIDENCE: f32 = 0.25;
/// Default Manual confidence before the user moves the control.
pub const DEFAULT_MANUAL_CONFIDENCE: f32 = 0.4;
/// Manual confidence range offered to the user.
pub const MANUAL_CONFIDENCE_MIN: f32 = 0.1;
pub const MANUAL_CONFIDENCE_MAX: f32 = 1.0;
/// IoU used for non-maximum suppression.
pub const DEFAULT_IOU: f32 = 0.7;
/// Detections kept per frame.
pub const MAX_DETECTIONS: usize = 50;

/// Detector thresholds for one run. Copied, never shared.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Thresholds {
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
}

impl Thresholds {
    pub fn new(confidence: f32) -> Result<Self> {
        Self::with_iou(confidence, DEFAULT_IOU)
    }

    pub fn with_iou(confidence: f32, iou: f32) -> Result<Self> {
        if !(confidence > 0.0 && confidence <= 1.0) {
            return Err(PotholeError::Config(format!(
                "confidence must be in (0, 1], got {confidence}"
            )));
        }
        if !(iou > 0.0 && iou <= 1.0) {
            return Err(PotholeError::Config(format!(
                "IoU threshold must be in (0, 1], got {iou}"
            )));
        }
        Ok(Self {
            confidence,
            iou,
            max_detections: MAX_DETECTIONS,
        })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: AUTO_CONFIDENCE,
            iou: DEFAULT_IOU,
            max_detections: MAX_DETECTIONS,
        }
    }
}

/// How the confidence threshold is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", content = "confidence", rename_all = "snake_case")]
pub enum DetectionMode {
    Auto,
    Manual(f32),
}

impl DetectionMode {
    pub fn confidence(&self) -> f32 {
        match self {
            DetectionMode::Auto => AUTO_CONFIDENCE,
            DetectionMode::Manual(value) => *value,
        }
    }

    fn validate(&self) -> Result<()> {
        if let DetectionMode::Manual(value) = self {
            if !(MANUAL_CONFIDENCE_MIN..=MANUAL_CONFIDENCE_MAX).contains(value) {
                return Err(PotholeError::Config(format!(
                    "manual confidence must be in [{MANUAL_CONFIDENCE_MIN}, {MANUAL_CONFIDENCE_MAX}], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Box color. Display only; never influences detections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxColor(pub [u8; 3]);

impl BoxColor {
    pub const RED: BoxColor = BoxColor([255, 0, 0]);

    pub fn rgb(&self) -> Rgb<u8> {
        Rgb(self.0)
    }
}

impl Default for BoxColor {
    fn default() -> Self {
        Self::RED
    }
}

impl FromStr for BoxColor {
    type Err = PotholeError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PotholeError::Config(format!(
                "box color must look like #RRGGBB, got '{s}'"
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| PotholeError::Config(format!("bad color channel in '{s}': {e}")))
        };
        Ok(BoxColor([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl fmt::Display for BoxColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl Serialize for BoxColor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// User-editable settings. Bound to a run through [`DetectionSettings::thresholds`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionSettings {
    mode: DetectionMode,
    pub box_color: BoxColor,
}

impl DetectionSettings {
    pub fn new(mode: DetectionMode, box_color: BoxColor) -> Result<Self> {
        mode.validate()?;
        Ok(Self { mode, box_color })
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DetectionMode) -> Result<()> {
        mode.validate()?;
        self.mode = mode;
        Ok(())
    }

    /// Snapshot the thresholds for a run.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            confidence: self.mode.confidence(),
            iou: DEFAULT_IOU,
            max_detections: MAX_DETECTIONS,
        }
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Auto,
            box_color: BoxColor::default(),
        }
    }
}

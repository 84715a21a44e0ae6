use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::ingest::CameraConfig;
use crate::settings::{BoxColor, DetectionMode, DetectionSettings, DEFAULT_MANUAL_CONFIDENCE};

const DEFAULT_WEIGHTS_PATH: &str = "model/best.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_BOX_COLOR: &str = "#FF0000";
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_OUTPUT_DIR: &str = "pothole_out";

#[derive(Debug, Deserialize, Default)]
struct PotholeConfigFile {
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
    camera: Option<CameraConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    weights_path: Option<PathBuf>,
    input_size: Option<u32>,
    backend: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    mode: Option<String>,
    confidence: Option<f32>,
    box_color: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
}

/// Which detector implementation to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendChoice {
    /// ONNX model when compiled in, otherwise the CPU heuristic.
    Auto,
    Tract,
    Cpu,
}

impl FromStr for BackendChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "tract" | "onnx" => Ok(BackendChoice::Tract),
            "cpu" => Ok(BackendChoice::Cpu),
            other => Err(anyhow!("unknown detector backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChoice {
    Auto,
    Manual,
}

impl FromStr for ModeChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ModeChoice::Auto),
            "manual" => Ok(ModeChoice::Manual),
            other => Err(anyhow!("detection mode must be auto or manual, got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PotholeConfig {
    pub model: ModelSettings,
    pub detection: DetectionSection,
    pub camera: CameraConfig,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub weights_path: PathBuf,
    pub input_size: u32,
    pub backend: BackendChoice,
}

#[derive(Debug, Clone)]
pub struct DetectionSection {
    pub mode: ModeChoice,
    /// Value used in Manual mode.
    pub confidence: f32,
    pub box_color: String,
}

impl PotholeConfig {
    /// Load from `POTHOLE_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POTHOLE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PotholeConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PotholeConfigFile) -> Result<Self> {
        let model = file.model.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();

        Ok(Self {
            model: ModelSettings {
                weights_path: model
                    .weights_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_PATH)),
                input_size: model.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                backend: model
                    .backend
                    .as_deref()
                    .map(BackendChoice::from_str)
                    .transpose()?
                    .unwrap_or(BackendChoice::Auto),
            },
            detection: DetectionSection {
                mode: detection
                    .mode
                    .as_deref()
                    .map(ModeChoice::from_str)
                    .transpose()?
                    .unwrap_or(ModeChoice::Auto),
                confidence: detection.confidence.unwrap_or(DEFAULT_MANUAL_CONFIDENCE),
                box_color: detection
                    .box_color
                    .unwrap_or_else(|| DEFAULT_BOX_COLOR.to_string()),
            },
            camera: CameraConfig {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            output_dir: file
                .output
                .and_then(|output| output.dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("POTHOLE_WEIGHTS") {
            if !path.trim().is_empty() {
                self.model.weights_path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("POTHOLE_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend.parse()?;
            }
        }
        if let Ok(confidence) = std::env::var("POTHOLE_CONFIDENCE") {
            let value: f32 = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("POTHOLE_CONFIDENCE must be a number"))?;
            self.detection.mode = ModeChoice::Manual;
            self.detection.confidence = value;
        }
        if let Ok(device) = std::env::var("POTHOLE_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.model.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        self.detection_settings()?;
        Ok(())
    }

    /// Settings the presentation layer starts from.
    pub fn detection_settings(&self) -> Result<DetectionSettings> {
        let mode = match self.detection.mode {
            ModeChoice::Auto => DetectionMode::Auto,
            ModeChoice::Manual => DetectionMode::Manual(self.detection.confidence),
        };
        let color: BoxColor = self.detection.box_color.parse()?;
        Ok(DetectionSettings::new(mode, color)?)
    }
}

fn read_config_file(path: &Path) -> Result<PotholeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::CpuBackend;
use crate::config::{BackendChoice, ModelSettings};

/// Build the detector backend described by `settings`.
///
/// `Auto` prefers the ONNX model and falls back to the CPU heuristic when the
/// ONNX backend is not compiled in or the weights file is missing.
pub fn load_backend(settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend {
        BackendChoice::Cpu => Ok(Box::new(CpuBackend::new())),
        BackendChoice::Tract => load_tract(settings),
        BackendChoice::Auto => {
            if cfg!(feature = "backend-tract") && settings.weights_path.is_file() {
                load_tract(settings)
            } else {
                log::warn!(
                    "no ONNX model available at {}; using the cpu backend",
                    settings.weights_path.display()
                );
                Ok(Box::new(CpuBackend::new()))
            }
        }
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    let backend = super::backends::TractBackend::new(&settings.weights_path, settings.input_size)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(_settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("the tract backend requires the backend-tract feature"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(backend: BackendChoice, weights: &str) -> ModelSettings {
        ModelSettings {
            weights_path: PathBuf::from(weights),
            input_size: 640,
            backend,
        }
    }

    #[test]
    fn auto_falls_back_to_cpu_without_weights() {
        let backend = load_backend(&settings(BackendChoice::Auto, "/nonexistent/best.onnx")).unwrap();
        assert_eq!(backend.name(), "cpu");
    }

    #[test]
    fn explicit_tract_with_missing_weights_fails() {
        assert!(load_backend(&settings(BackendChoice::Tract, "/nonexistent/best.onnx")).is_err());
    }
}

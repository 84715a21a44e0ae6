use std::io::Write;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use pothole_detect::config::{BackendChoice, ModeChoice, PotholeConfig};
use pothole_detect::{BoxColor, DetectionMode};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "POTHOLE_CONFIG",
        "POTHOLE_WEIGHTS",
        "POTHOLE_BACKEND",
        "POTHOLE_CONFIDENCE",
        "POTHOLE_CAMERA",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PotholeConfig::load().expect("load defaults");
    assert_eq!(cfg.model.weights_path.to_str(), Some("model/best.onnx"));
    assert_eq!(cfg.model.input_size, 640);
    assert_eq!(cfg.model.backend, BackendChoice::Auto);
    assert_eq!(cfg.detection.mode, ModeChoice::Auto);
    assert_eq!(cfg.camera.device, "/dev/video0");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.target_fps, 10);
    assert_eq!(cfg.output_dir.to_str(), Some("pothole_out"));

    let settings = cfg.detection_settings().unwrap();
    assert_eq!(settings.mode(), DetectionMode::Auto);
    assert_eq!(settings.box_color, BoxColor::RED);
    assert_eq!(settings.thresholds().confidence, 0.25);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r##"{
            "model": { "weights_path": "/opt/models/potholes.onnx", "input_size": 320, "backend": "cpu" },
            "detection": { "mode": "manual", "confidence": 0.5, "box_color": "#00FF00" },
            "camera": { "device": "/dev/video2", "width": 1280, "height": 720, "target_fps": 15 },
            "output": { "dir": "/tmp/pothole-results" }
        }"##,
    );
    std::env::set_var("POTHOLE_CONFIG", file.path());
    std::env::set_var("POTHOLE_CAMERA", "stub://camera");
    std::env::set_var("POTHOLE_CONFIDENCE", "0.65");

    let cfg = PotholeConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.model.weights_path.to_str(), Some("/opt/models/potholes.onnx"));
    assert_eq!(cfg.model.input_size, 320);
    assert_eq!(cfg.model.backend, BackendChoice::Cpu);
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.output_dir.to_str(), Some("/tmp/pothole-results"));

    let settings = cfg.detection_settings().unwrap();
    assert_eq!(settings.mode(), DetectionMode::Manual(0.65));
    assert_eq!(settings.box_color, BoxColor([0, 255, 0]));
}

#[test]
fn rejects_out_of_range_confidence() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("POTHOLE_CONFIDENCE", "0.05");
    let result = PotholeConfig::load();
    clear_env();
    assert!(result.is_err());
}

#[test]
fn rejects_invalid_file_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let bad_color = write_config(r#"{ "detection": { "box_color": "red" } }"#);
    assert!(PotholeConfig::load_from(Some(bad_color.path())).is_err());

    let bad_backend = write_config(r#"{ "model": { "backend": "cuda" } }"#);
    assert!(PotholeConfig::load_from(Some(bad_backend.path())).is_err());

    let zero_size = write_config(r#"{ "model": { "input_size": 0 } }"#);
    assert!(PotholeConfig::load_from(Some(zero_size.path())).is_err());

    let not_json = write_config("model = 1");
    assert!(PotholeConfig::load_from(Some(not_json.path())).is_err());
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("POTHOLE_CONFIG", "/nonexistent/pothole.json");
    let result = PotholeConfig::load();
    clear_env();
    assert!(result.is_err());
}

//! pothole_detect - find potholes in an image, a video file or a live camera

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use pothole_detect::{
    analyze_image, load_backend, shared_detector, AnnotatedFrame, BackendChoice, CancelToken,
    DetectionMode, DetectionPipeline, DetectionSettings, DetectorBackend, FrameResult,
    ModeChoice, PotholeConfig, RunSummary, SourceRequest, DOWNLOAD_FILE_NAME,
};

#[path = "../ui.rs"]
mod ui;

const SNAPSHOT_FILE_NAME: &str = "camera_snapshot.png";

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// JSON config file (overrides POTHOLE_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Detection mode (auto|manual).
    #[arg(long, global = true, value_name = "MODE")]
    mode: Option<String>,
    /// Manual confidence threshold in [0.1, 1.0]. Implies --mode manual.
    #[arg(long, global = true)]
    confidence: Option<f32>,
    /// Box color as #RRGGBB.
    #[arg(long, global = true, value_name = "HEX")]
    box_color: Option<String>,
    /// Detector backend (auto|tract|cpu).
    #[arg(long, global = true)]
    backend: Option<String>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE")]
    ui: String,
    /// Print the run summary as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one PNG or JPEG image.
    Image {
        path: PathBuf,
        /// Where to write the annotated PNG.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Analyze every frame of a video file.
    Video {
        path: PathBuf,
        /// Write each annotated frame into the output directory.
        #[arg(long)]
        save_frames: bool,
    },
    /// Analyze a live camera until Ctrl-C.
    Camera {
        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<u64>,
        /// Save the last annotated frame.
        #[arg(long)]
        snapshot: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::new(ui::UiMode::parse(&args.ui), is_tty, args.json);

    let mut cfg = match &args.config {
        Some(path) => PotholeConfig::load_from(Some(path))?,
        None => PotholeConfig::load()?,
    };
    if let Some(backend) = &args.backend {
        cfg.model.backend = backend.parse::<BackendChoice>()?;
    }
    let settings = settings_from_args(&args, &cfg)?;

    let detector = {
        let _stage = ui.stage("Load detector");
        shared_detector(|| load_backend(&cfg.model))?
    };
    log::info!(
        "detector '{}', confidence {}, box color {}",
        detector.name(),
        settings.thresholds().confidence,
        settings.box_color
    );
    let mut guard = detector.lock()?;
    let backend: &mut dyn DetectorBackend = &mut **guard;

    match args.command {
        Command::Image { ref path, ref out } => {
            let out = out
                .clone()
                .unwrap_or_else(|| cfg.output_dir.join(DOWNLOAD_FILE_NAME));
            run_image(path, &out, backend, &settings, args.json)
        }
        Command::Video {
            ref path,
            save_frames,
        } => {
            let frames_dir = save_frames.then(|| cfg.output_dir.clone());
            run_video(path, frames_dir.as_deref(), backend, &settings, &ui, args.json)
        }
        Command::Camera {
            max_frames,
            snapshot,
        } => {
            let snapshot_path = snapshot.then(|| cfg.output_dir.join(SNAPSHOT_FILE_NAME));
            run_camera(
                &cfg,
                max_frames,
                snapshot_path.as_deref(),
                backend,
                &settings,
                &ui,
                args.json,
            )
        }
    }
}

fn settings_from_args(args: &Args, cfg: &PotholeConfig) -> Result<DetectionSettings> {
    let mut settings = cfg.detection_settings()?;
    let mode = args
        .mode
        .as_deref()
        .map(str::parse::<ModeChoice>)
        .transpose()?;
    match (mode, args.confidence) {
        (Some(ModeChoice::Auto), Some(_)) => {
            return Err(anyhow!("--confidence only applies in manual mode"));
        }
        (Some(ModeChoice::Auto), None) => settings.set_mode(DetectionMode::Auto)?,
        (_, Some(value)) => settings.set_mode(DetectionMode::Manual(value))?,
        (Some(ModeChoice::Manual), None) => {
            settings.set_mode(DetectionMode::Manual(cfg.detection.confidence))?
        }
        (None, None) => {}
    }
    if let Some(color) = &args.box_color {
        settings.box_color = color.parse()?;
    }
    Ok(settings)
}

fn run_image(
    path: &Path,
    out: &Path,
    backend: &mut dyn DetectorBackend,
    settings: &DetectionSettings,
    json: bool,
) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let result = analyze_image(bytes, backend, settings)?;
    if let Some(err) = &result.error {
        return Err(anyhow!("{}", err));
    }
    write_png(&result.annotated, out)?;

    if json {
        let report = serde_json::json!({
            "image": path.display().to_string(),
            "annotated": out.display().to_string(),
            "thresholds": result.thresholds,
            "detections": result.detections,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} pothole(s) detected; annotated image written to {}",
            result.detection_count(),
            out.display()
        );
    }
    Ok(())
}

fn run_video(
    path: &Path,
    frames_dir: Option<&Path>,
    backend: &mut dyn DetectorBackend,
    settings: &DetectionSettings,
    ui: &ui::Ui,
    json: bool,
) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_string());
    let mut pipeline = {
        let _stage = ui.stage("Open video");
        DetectionPipeline::open(SourceRequest::VideoBytes { bytes, extension }, backend, settings)?
    };

    let progress = ui.frames(pipeline.metrics().expected_frames);
    for result in pipeline.by_ref() {
        progress.advance(result.metrics.frames_processed, result.metrics.total_detections);
        if let Some(dir) = frames_dir {
            write_png(&result.annotated, &dir.join(frame_file_name(&result)))?;
        }
    }
    let summary = pipeline.finish();
    progress.finish(summary.metrics.frames_processed);
    report(&summary, json)
}

fn run_camera(
    cfg: &PotholeConfig,
    max_frames: Option<u64>,
    snapshot: Option<&Path>,
    backend: &mut dyn DetectorBackend,
    settings: &DetectionSettings,
    ui: &ui::Ui,
    json: bool,
) -> Result<()> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("error setting Ctrl-C handler")?;

    let request = SourceRequest::Camera {
        config: cfg.camera.clone(),
        cancel: cancel.clone(),
    };
    let mut pipeline = {
        let _stage = ui.stage("Open camera");
        DetectionPipeline::open(request, backend, settings)?
    };
    log::info!("camera running; press Ctrl-C to stop");

    let progress = ui.frames(None);
    let mut last: Option<AnnotatedFrame> = None;
    for result in pipeline.by_ref() {
        progress.advance(result.metrics.frames_processed, result.metrics.total_detections);
        if max_frames.is_some_and(|max| result.metrics.frames_processed >= max) {
            cancel.cancel();
        }
        last = Some(result.annotated);
    }
    let summary = pipeline.finish();
    progress.finish(summary.metrics.frames_processed);

    if let (Some(path), Some(frame)) = (snapshot, &last) {
        write_png(frame, path)?;
        log::info!("snapshot written to {}", path.display());
    }
    report(&summary, json)
}

fn frame_file_name(result: &FrameResult) -> String {
    format!("frame_{:06}.png", result.index)
}

fn write_png(frame: &AnnotatedFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let png = frame.to_png()?;
    fs::write(path, png).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn report(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!(
        "{} frame(s) analyzed, {} pothole(s) detected",
        summary.metrics.frames_processed, summary.metrics.total_detections
    );
    if summary.metrics.failed_frames > 0 {
        println!(
            "detection failed on {} frame(s)",
            summary.metrics.failed_frames
        );
    }
    if summary.ended_early() {
        match summary.metrics.expected_frames {
            Some(expected) => println!(
                "stream ended early: {} of {} frames",
                summary.metrics.frames_processed, expected
            ),
            None => println!("stream ended early"),
        }
    }
    Ok(())
}

//! signtracking: hand sign recognition from a camera, a recorded frame
//! directory, or HTTP uploads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde_json::json;
use tracing::{info, warn};

use signtracking::announcer;
use signtracking::classifier::model_onnx::OnnxGestureModel;
use signtracking::classifier::GestureClassifier;
use signtracking::config::{Config, DEFAULT_CONFIG_PATH};
use signtracking::endpoint::SingleShot;
use signtracking::hand_landmarks::model_mediapipe::MediapipeHandLandmarksModel;
use signtracking::hand_landmarks::HandLandmarkDetector;
use signtracking::overlay::FrameAnnotator;
use signtracking::pipeline::{FrameSource, StopHandle, StreamPipeline};
use signtracking::recording::ImageSequence;
use signtracking::server::PredictServer;

#[derive(Parser, Debug)]
#[command(name = "signtracking", version, about = "Hand sign recognition")]
struct Cli {
    /// Settings file (default: ./signtracking.toml if present)
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recognize and announce signs from a live or recorded stream
    Stream {
        /// Replay a directory of frames instead of the camera
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Camera device index
        #[arg(long, default_value_t = 0)]
        camera: u32,

        /// Camera format index
        #[arg(long, default_value_t = 0)]
        format: i32,

        /// Manual exposure (turns auto exposure off)
        #[arg(long)]
        exposure: Option<i32>,

        #[arg(long)]
        gain: Option<i32>,

        #[arg(long)]
        brightness: Option<i32>,

        /// Seconds to wait for a camera frame before giving up
        #[arg(long, default_value_t = 5)]
        frame_timeout: u64,

        /// Write annotated frames to this directory
        #[arg(long)]
        record: Option<PathBuf>,

        /// TrueType font for the label overlay
        #[arg(long)]
        font: Option<PathBuf>,

        /// Frames before the same sign is announced again
        #[arg(long)]
        cooldown: Option<u32>,

        /// Do not flip frames horizontally
        #[arg(long)]
        no_mirror: bool,
    },

    /// Serve POST /predict over HTTP
    Serve {
        /// Address to listen on, e.g. 0.0.0.0:5000
        #[arg(long)]
        listen: Option<String>,

        #[arg(long)]
        workers: Option<usize>,
    },

    /// Classify image files and print one JSON line per file
    Classify {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signtracking=info".into()),
        )
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = Config::load(&config_path, cli.config.is_some())
        .with_context(|| format!("loading {}", config_path.display()))?;

    info!("signtracking v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Stream {
            frames,
            camera,
            format,
            exposure,
            gain,
            brightness,
            frame_timeout,
            record,
            font,
            cooldown,
            no_mirror,
        } => {
            if let Some(cooldown) = cooldown {
                config.debounce.cooldown_frames = cooldown;
            }
            if no_mirror {
                config.detector.mirror = false;
            }
            if record.is_some() {
                config.overlay.record_dir = record;
            }
            if font.is_some() {
                config.overlay.font = font;
            }
            config.validate()?;

            let source = match frames {
                Some(dir) => Box::new(
                    ImageSequence::open(&dir)
                        .with_context(|| format!("opening frames in {}", dir.display()))?,
                ) as Box<dyn FrameSource>,
                None => open_camera(
                    camera,
                    format,
                    exposure,
                    gain,
                    brightness,
                    std::time::Duration::from_secs(frame_timeout),
                )?,
            };
            stream(&config, source)
        }
        Command::Serve { listen, workers } => {
            if let Some(listen) = listen {
                config.server.listen_addr = listen;
            }
            if let Some(workers) = workers {
                config.server.workers = workers;
            }
            config.validate()?;
            serve(&config)
        }
        Command::Classify { images } => classify(&config, &images),
    }
}

fn load_models(
    config: &Config,
) -> anyhow::Result<(Arc<dyn HandLandmarkDetector>, Arc<GestureClassifier>)> {
    let detector = MediapipeHandLandmarksModel::load(
        &config.models.hand_landmarks,
        &config.detector,
        config.models.intra_threads,
    )?;
    let classifier = OnnxGestureModel::load(&config.models)?;
    info!(
        hand_landmarks = %config.models.hand_landmarks.display(),
        classifier = %config.models.classifier.display(),
        "models loaded"
    );
    Ok((Arc::new(detector), Arc::new(GestureClassifier::new(classifier))))
}

fn stream(config: &Config, source: Box<dyn FrameSource>) -> anyhow::Result<()> {
    let (detector, classifier) = load_models(config)?;
    let announcer = announcer::from_config(&config.announcer).context("starting announcer")?;

    let mut pipeline = StreamPipeline::new(detector, classifier, config.debounce, announcer)
        .with_mirror(config.detector.mirror);

    let overlay = &config.overlay;
    if overlay.font.is_some() || overlay.record_dir.is_some() {
        let annotator =
            FrameAnnotator::load(overlay.font.as_deref(), overlay.record_dir.as_deref())?;
        pipeline = pipeline.with_overlay(Box::new(annotator));
    }

    #[cfg(feature = "control")]
    let _control = signtracking::control::ControlServer::start(
        &config.control.address,
        pipeline.stop_handle(),
    )?;

    let summary = pipeline.run(source);
    for event in &summary.events {
        println!("{}\t{}", event.frame_index, event.label);
    }
    Ok(())
}

#[cfg(feature = "webcam")]
fn open_camera(
    device: u32,
    format: i32,
    exposure: Option<i32>,
    gain: Option<i32>,
    brightness: Option<i32>,
    frame_timeout: std::time::Duration,
) -> anyhow::Result<Box<dyn FrameSource>> {
    use signtracking::webcam::{CameraSettings, WebcamSource};

    let settings = CameraSettings {
        exposure,
        auto_exposure: exposure.map(|_| false),
        gain,
        brightness,
    };
    let camera = WebcamSource::open(device, format, &settings, frame_timeout)?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "webcam"))]
fn open_camera(
    _device: u32,
    _format: i32,
    _exposure: Option<i32>,
    _gain: Option<i32>,
    _brightness: Option<i32>,
    _frame_timeout: std::time::Duration,
) -> anyhow::Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "built without camera support; rebuild with --features webcam or pass --frames <dir>"
    )
}

fn serve(config: &Config) -> anyhow::Result<()> {
    let (detector, classifier) = load_models(config)?;
    let shot = SingleShot::new(detector, classifier);
    let server = PredictServer::bind(shot, &config.server)?;
    server.run(StopHandle::new());
    Ok(())
}

fn classify(config: &Config, images: &[PathBuf]) -> anyhow::Result<()> {
    let (detector, classifier) = load_models(config)?;
    let shot = SingleShot::new(detector, classifier);

    let lines: Vec<serde_json::Value> = images
        .par_iter()
        .map(|path| classify_file(&shot, path))
        .collect();

    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn classify_file(shot: &SingleShot, path: &Path) -> serde_json::Value {
    let result = image::open(path)
        .map_err(signtracking::Error::from)
        .and_then(|image| shot.infer(&image));
    match result {
        Ok(inference) => json!({ "path": path, "prediction": inference.as_str() }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "classification failed");
            json!({ "path": path, "error": e.to_string() })
        }
    }
}

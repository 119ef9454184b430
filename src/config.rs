//! Settings file (`signtracking.toml`).
//!
//! Every field has a default so an empty or missing file is a valid
//! configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "signtracking.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models: ModelsConfig,
    pub detector: DetectorConfig,
    pub debounce: DebounceConfig,
    pub announcer: AnnouncerConfig,
    pub overlay: OverlayConfig,
    pub server: ServerConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_classifier_path")]
    pub classifier: PathBuf,
    #[serde(default = "default_hand_landmarks_path")]
    pub hand_landmarks: PathBuf,
    /// Index of the probability tensor among the classifier outputs.
    #[serde(default = "default_probability_output")]
    pub probability_output: usize,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: i16,
}

fn default_classifier_path() -> PathBuf {
    PathBuf::from("models/gesture_classifier.onnx")
}

fn default_hand_landmarks_path() -> PathBuf {
    PathBuf::from("models/hand_landmark.onnx")
}

fn default_probability_output() -> usize {
    1
}

fn default_intra_threads() -> i16 {
    4
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            classifier: default_classifier_path(),
            hand_landmarks: default_hand_landmarks_path(),
            probability_output: default_probability_output(),
            intra_threads: default_intra_threads(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    /// Flip stream frames horizontally before detection (selfie view).
    #[serde(default = "default_mirror")]
    pub mirror: bool,
    /// Side of the square network input, in pixels.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Whether the hand-presence output is a raw logit.
    #[serde(default = "default_presence_is_logit")]
    pub presence_is_logit: bool,
}

fn default_min_detection_confidence() -> f32 {
    0.5
}

fn default_mirror() -> bool {
    true
}

fn default_input_size() -> u32 {
    224
}

fn default_presence_is_logit() -> bool {
    true
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: default_min_detection_confidence(),
            mirror: default_mirror(),
            input_size: default_input_size(),
            presence_is_logit: default_presence_is_logit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DebounceConfig {
    /// Predictions at or below this confidence are ignored.
    #[serde(default = "default_confidence_gate")]
    pub confidence_gate: f32,
    /// Frames before the same label may fire again.
    #[serde(default = "default_cooldown_frames")]
    pub cooldown_frames: u32,
}

fn default_confidence_gate() -> f32 {
    0.4
}

fn default_cooldown_frames() -> u32 {
    30
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            confidence_gate: default_confidence_gate(),
            cooldown_frames: default_cooldown_frames(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncerKind {
    Log,
    Command,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncerConfig {
    #[serde(default = "default_announcer_kind")]
    pub kind: AnnouncerKind,
    /// Text-to-speech program for `kind = "command"`.
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// `{label}` is replaced with the gesture label.
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_background")]
    pub background: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_announcer_kind() -> AnnouncerKind {
    AnnouncerKind::Log
}

fn default_program() -> String {
    "espeak".to_string()
}

fn default_template() -> String {
    "Predicted sign is {label}".to_string()
}

fn default_background() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    4
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            kind: default_announcer_kind(),
            program: default_program(),
            args: Vec::new(),
            template: default_template(),
            background: default_background(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// TrueType font used for the label text. Without it no text is drawn.
    pub font: Option<PathBuf>,
    /// Directory that receives one annotated PNG per frame.
    pub record_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            workers: default_workers(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_address")]
    pub address: String,
}

fn default_control_address() -> String {
    "tcp://127.0.0.1:54321".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: default_control_address(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`; a missing file yields the defaults only when `required` is false.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                Ok(Config::default())
            }
            Err(e) => Err(Error::Config(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let gate = self.debounce.confidence_gate;
        if !(0.0..=1.0).contains(&gate) {
            return Err(Error::Config(format!(
                "debounce.confidence_gate must be within [0, 1], got {gate}"
            )));
        }
        if self.debounce.cooldown_frames == 0 {
            return Err(Error::Config("debounce.cooldown_frames must be at least 1".into()));
        }
        let detection = self.detector.min_detection_confidence;
        if !(0.0..=1.0).contains(&detection) {
            return Err(Error::Config(format!(
                "detector.min_detection_confidence must be within [0, 1], got {detection}"
            )));
        }
        if self.detector.input_size == 0 {
            return Err(Error::Config("detector.input_size must be positive".into()));
        }
        if self.server.workers == 0 {
            return Err(Error::Config("server.workers must be at least 1".into()));
        }
        if self.announcer.queue_capacity == 0 {
            return Err(Error::Config("announcer.queue_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

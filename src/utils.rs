use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ort::{Environment, ExecutionProvider, Session, SessionBuilder};

use crate::error::{Error, Result};

/// Rolling frames-per-second estimate over the last few frame deltas.
pub struct FrameRate {
    deltas: VecDeque<f32>,
    last_frame_time: Option<Instant>,
    max_length: usize,
}

impl FrameRate {
    pub fn new(max_length: usize) -> Self {
        Self {
            deltas: VecDeque::with_capacity(max_length),
            last_frame_time: None,
            max_length: max_length.max(1),
        }
    }

    /// Record that a frame finished at `now`.
    pub fn tick(&mut self, now: Instant) {
        if let Some(last) = self.last_frame_time {
            self.push_delta(now.duration_since(last).as_secs_f32());
        }
        self.last_frame_time = Some(now);
    }

    fn push_delta(&mut self, delta: f32) {
        self.deltas.push_back(delta);

        if self.deltas.len() > self.max_length {
            self.deltas.pop_front();
        }
    }

    /// `None` until two frames have been seen.
    pub fn fps(&self) -> Option<f32> {
        if self.deltas.is_empty() {
            return None;
        }
        let mean = self.deltas.iter().sum::<f32>() / self.deltas.len() as f32;
        if mean > 0.0 {
            Some(1.0 / mean)
        } else {
            None
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(10)
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Index and value of the largest element; the first one wins on ties.
/// `None` for empty input or when any value is NaN.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            return None;
        }
        match best {
            Some((_, max)) if v <= max => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// Load an ONNX model from disk into a CPU session.
pub fn onnx_session(
    capability: &'static str,
    path: &Path,
    intra_threads: i16,
) -> Result<Session> {
    let environment: Arc<Environment> = Environment::builder()
        .with_name(capability)
        .with_execution_providers([ExecutionProvider::CPU(Default::default())])
        .build()
        .map_err(|e| Error::unavailable(capability, e))?
        .into_arc();

    SessionBuilder::new(&environment)
        .and_then(|builder| builder.with_intra_threads(intra_threads))
        .and_then(|builder| builder.with_model_from_file(path))
        .map_err(|e| Error::unavailable(capability, format!("{}: {}", path.display(), e)))
}

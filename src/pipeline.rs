//! Continuous recognition over a stream of frames.
//!
//! Each frame is fully processed (detect, normalize, classify, debounce,
//! announce) before the next one is requested. Failures on a single frame are
//! logged and the frame counts as having no prediction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::announcer::Announcer;
use crate::classifier::{GestureClassifier, Prediction};
use crate::config::DebounceConfig;
use crate::debounce::{DebounceEngine, GestureEvent};
use crate::error::Result;
use crate::features::normalize;
use crate::hand_landmarks::{HandLandmarkDetector, LandmarkSet};
use crate::overlay::{Overlay, TextStyle, TEXT_POSITION};
use crate::utils::FrameRate;

const FPS_LOG_INTERVAL: u64 = 30;

/// Produces frames until the stream ends.
pub trait FrameSource {
    /// `None` once the source is exhausted or a read fails.
    fn next_frame(&mut self) -> Option<DynamicImage>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Option<DynamicImage> {
        (**self).next_frame()
    }
}

/// Asks a running pipeline to stop once its current frame is done.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    NoHand,
    /// Hand found but normalization or classification failed.
    Rejected,
    LowConfidence(Prediction),
    Confident(Prediction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub outcome: FrameOutcome,
    pub event: Option<GestureEvent>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    pub frames: u64,
    pub events: Vec<GestureEvent>,
    /// True when the run ended through the stop handle.
    pub stopped: bool,
}

pub struct StreamPipeline {
    detector: Arc<dyn HandLandmarkDetector>,
    classifier: Arc<GestureClassifier>,
    debounce: DebounceEngine,
    announcer: Box<dyn Announcer>,
    overlay: Option<Box<dyn Overlay>>,
    mirror: bool,
    stop: StopHandle,
    frame_rate: FrameRate,
}

impl StreamPipeline {
    pub fn new(
        detector: Arc<dyn HandLandmarkDetector>,
        classifier: Arc<GestureClassifier>,
        debounce: DebounceConfig,
        announcer: Box<dyn Announcer>,
    ) -> Self {
        Self {
            detector,
            classifier,
            debounce: DebounceEngine::new(debounce),
            announcer,
            overlay: None,
            mirror: false,
            stop: StopHandle::new(),
            frame_rate: FrameRate::default(),
        }
    }

    pub fn with_overlay(mut self, overlay: Box<dyn Overlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Flip frames horizontally before detection.
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn debounce(&self) -> &DebounceEngine {
        &self.debounce
    }

    /// Process frames until the source ends or a stop is requested.
    ///
    /// The debounce state starts fresh and the source is dropped on return.
    pub fn run<S: FrameSource>(&mut self, mut source: S) -> StreamSummary {
        self.debounce = DebounceEngine::new(*self.debounce.config());
        self.frame_rate = FrameRate::default();

        let mut summary = StreamSummary::default();
        info!("stream started");

        loop {
            if self.stop.is_stopped() {
                summary.stopped = true;
                break;
            }
            let Some(frame) = source.next_frame() else {
                break;
            };

            let report = self.process_frame(frame);
            summary.frames += 1;
            summary.events.extend(report.event);

            self.frame_rate.tick(Instant::now());
            if (report.frame_index + 1) % FPS_LOG_INTERVAL == 0 {
                if let Some(fps) = self.frame_rate.fps() {
                    debug!(frame = report.frame_index, fps = %format!("{fps:.1}"), "frame rate");
                }
            }
        }
        drop(source);

        info!(
            frames = summary.frames,
            events = summary.events.len(),
            stopped = summary.stopped,
            "stream finished"
        );
        summary
    }

    /// Run one frame through detection, classification and debounce.
    pub fn process_frame(&mut self, frame: DynamicImage) -> FrameReport {
        let frame_index = self.debounce.frames_seen();
        let mut frame = if self.mirror { frame.fliph() } else { frame };

        let hand = match self.detector.detect(&frame) {
            Ok(hand) => hand,
            Err(e) => {
                warn!(frame = frame_index, error = %e, "hand detection failed");
                None
            }
        };

        let outcome = match &hand {
            None => FrameOutcome::NoHand,
            Some(landmarks) => match self.predict(landmarks) {
                Ok(prediction) if self.debounce.passes_gate(&prediction) => {
                    FrameOutcome::Confident(prediction)
                }
                Ok(prediction) => FrameOutcome::LowConfidence(prediction),
                Err(e) => {
                    warn!(frame = frame_index, error = %e, "prediction error");
                    FrameOutcome::Rejected
                }
            },
        };

        let prediction = match outcome {
            FrameOutcome::Confident(p) | FrameOutcome::LowConfidence(p) => Some(p),
            FrameOutcome::NoHand | FrameOutcome::Rejected => None,
        };

        let event = self.debounce.observe(prediction.as_ref());
        if let Some(event) = &event {
            info!(frame = frame_index, label = %event.label, "gesture");
            if let Err(e) = self.announcer.announce(event.label.as_str()) {
                warn!(frame = frame_index, error = %e, "announcer failure");
            }
        }

        if let Some(overlay) = self.overlay.as_mut() {
            annotate(overlay.as_mut(), &mut frame, hand.as_ref(), &outcome);
            if let Err(e) = overlay.present(&frame, frame_index) {
                warn!(frame = frame_index, error = %e, "overlay failure");
            }
        }

        FrameReport {
            frame_index,
            outcome,
            event,
        }
    }

    fn predict(&self, landmarks: &LandmarkSet) -> Result<Prediction> {
        let features = normalize(landmarks)?;
        self.classifier.classify(&features)
    }
}

fn annotate(
    overlay: &mut dyn Overlay,
    frame: &mut DynamicImage,
    hand: Option<&LandmarkSet>,
    outcome: &FrameOutcome,
) {
    if let Some(landmarks) = hand {
        overlay.draw_landmarks(frame, landmarks);
    }
    match outcome {
        FrameOutcome::Confident(p) => {
            let text = format!("{} ({:.2})", p.label, p.confidence);
            overlay.draw_text(frame, &text, TEXT_POSITION, TextStyle::Confident);
        }
        FrameOutcome::LowConfidence(_) => {
            overlay.draw_text(frame, "Low confidence", TEXT_POSITION, TextStyle::LowConfidence);
        }
        FrameOutcome::NoHand | FrameOutcome::Rejected => {}
    }
}

//! Temporal debounce of per-frame predictions into gesture events.
//!
//! A prediction passes the confidence gate when its confidence is strictly
//! above the gate. A gated prediction fires an event when its label differs
//! from the last emitted one, or when at least `cooldown_frames` frames have
//! gone by since the last event. Frames without a usable prediction only
//! advance the counter; they never clear the remembered label.

use crate::classifier::Prediction;
use crate::config::DebounceConfig;
use crate::labels::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEvent {
    pub label: Label,
    /// Zero-based index of the frame the event fired on.
    pub frame_index: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceState {
    pub last_emitted: Option<Label>,
    pub frames_since_last_emit: u32,
}

impl DebounceState {
    /// Pure transition for one frame.
    pub fn step(
        &self,
        prediction: Option<&Prediction>,
        config: &DebounceConfig,
        frame_index: u64,
    ) -> (DebounceState, Option<GestureEvent>) {
        let waited = DebounceState {
            last_emitted: self.last_emitted,
            frames_since_last_emit: self.frames_since_last_emit.saturating_add(1),
        };

        let Some(prediction) = prediction.filter(|p| p.confidence > config.confidence_gate)
        else {
            return (waited, None);
        };

        let is_new_label = self.last_emitted != Some(prediction.label);
        let cooled_down = self.frames_since_last_emit >= config.cooldown_frames;

        if is_new_label || cooled_down {
            let state = DebounceState {
                last_emitted: Some(prediction.label),
                frames_since_last_emit: 0,
            };
            let event = GestureEvent {
                label: prediction.label,
                frame_index,
            };
            (state, Some(event))
        } else {
            (waited, None)
        }
    }
}

/// Debounce state of one stream plus its frame counter.
#[derive(Debug, Clone)]
pub struct DebounceEngine {
    config: DebounceConfig,
    state: DebounceState,
    next_frame: u64,
}

impl DebounceEngine {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            state: DebounceState::default(),
            next_frame: 0,
        }
    }

    /// Feed the outcome of the next frame.
    pub fn observe(&mut self, prediction: Option<&Prediction>) -> Option<GestureEvent> {
        let (state, event) = self.state.step(prediction, &self.config, self.next_frame);
        self.state = state;
        self.next_frame += 1;
        event
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    /// Number of frames observed so far.
    pub fn frames_seen(&self) -> u64 {
        self.next_frame
    }

    /// Whether a prediction clears the confidence gate.
    pub fn passes_gate(&self, prediction: &Prediction) -> bool {
        prediction.confidence > self.config.confidence_gate
    }
}

impl Default for DebounceEngine {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(label: Label, confidence: f32) -> Option<Prediction> {
        Some(Prediction::new(label, confidence))
    }

    fn run(engine: &mut DebounceEngine, frames: &[Option<Prediction>]) -> Vec<GestureEvent> {
        frames
            .iter()
            .filter_map(|f| engine.observe(f.as_ref()))
            .collect()
    }

    #[test]
    fn first_confident_frame_emits_immediately() {
        let mut engine = DebounceEngine::default();
        let event = engine.observe(p(Label::Hello, 0.9).as_ref());
        assert_eq!(
            event,
            Some(GestureEvent {
                label: Label::Hello,
                frame_index: 0
            })
        );
    }

    #[test]
    fn label_change_then_cooldown_reemit() {
        let mut frames = vec![p(Label::A, 0.9); 5];
        frames.extend(vec![p(Label::B, 0.9); 1]);
        frames.extend(vec![p(Label::B, 0.9); 35]);

        let mut engine = DebounceEngine::default();
        let events = run(&mut engine, &frames);

        let fired: Vec<(Label, u64)> = events.iter().map(|e| (e.label, e.frame_index)).collect();
        assert_eq!(fired, vec![(Label::A, 0), (Label::B, 5), (Label::B, 36)]);
    }

    #[test]
    fn low_confidence_never_emits_nor_forgets_the_label() {
        let mut engine = DebounceEngine::default();
        assert!(engine.observe(p(Label::C, 0.9).as_ref()).is_some());

        let mut frames = Vec::new();
        for i in 0..100 {
            let label = if i % 2 == 0 { Label::D } else { Label::C };
            frames.push(p(label, 0.4 - (i % 5) as f32 * 0.05));
            frames.push(None);
        }
        assert!(run(&mut engine, &frames).is_empty());
        assert_eq!(engine.state().last_emitted, Some(Label::C));
        assert_eq!(engine.state().frames_since_last_emit, 200);
    }

    #[test]
    fn gate_is_exclusive() {
        let mut engine = DebounceEngine::default();
        assert_eq!(engine.observe(p(Label::A, 0.4).as_ref()), None);
        assert!(engine.observe(p(Label::A, 0.4001).as_ref()).is_some());
    }

    #[test]
    fn steady_prediction_reemits_on_cooldown_only() {
        let cooldown = 30;
        let mut engine = DebounceEngine::new(DebounceConfig {
            confidence_gate: 0.4,
            cooldown_frames: cooldown,
        });
        let frames = vec![p(Label::L, 0.95); 200];
        let events = run(&mut engine, &frames);

        let indices: Vec<u64> = events.iter().map(|e| e.frame_index).collect();
        assert_eq!(indices, vec![0, 31, 62, 93, 124, 155, 186]);
        for pair in indices.windows(2) {
            assert!(pair[1] - pair[0] >= cooldown as u64);
        }
    }

    #[test]
    fn low_confidence_gap_counts_toward_cooldown() {
        let mut engine = DebounceEngine::default();
        let mut frames = vec![p(Label::V, 0.9)];
        frames.extend(vec![None; 29]);
        frames.push(p(Label::V, 0.9)); // counter is 29 here
        frames.push(p(Label::V, 0.9)); // counter is 30 here
        let events = run(&mut engine, &frames);

        let indices: Vec<u64> = events.iter().map(|e| e.frame_index).collect();
        assert_eq!(indices, vec![0, 31]);
    }

    #[test]
    fn duplicate_just_above_gate_is_suppressed() {
        let config = DebounceConfig::default();
        let state = DebounceState {
            last_emitted: Some(Label::C),
            frames_since_last_emit: 0,
        };
        let (next, event) = state.step(p(Label::C, 0.41).as_ref(), &config, 7);

        assert_eq!(event, None);
        assert_eq!(next.last_emitted, Some(Label::C));
        assert_eq!(next.frames_since_last_emit, 1);
    }

    #[test]
    fn step_is_pure() {
        let config = DebounceConfig::default();
        let state = DebounceState::default();
        let a = state.step(p(Label::Q, 0.8).as_ref(), &config, 3);
        let b = state.step(p(Label::Q, 0.8).as_ref(), &config, 3);
        assert_eq!(a, b);
        assert_eq!(state, DebounceState::default());
    }

    #[test]
    fn counter_saturates() {
        let config = DebounceConfig::default();
        let state = DebounceState {
            last_emitted: Some(Label::A),
            frames_since_last_emit: u32::MAX,
        };
        let (next, event) = state.step(None, &config, 0);
        assert_eq!(event, None);
        assert_eq!(next.frames_since_last_emit, u32::MAX);
    }
}

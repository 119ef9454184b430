//! Real-time recognition of hand signs from camera frames.
//!
//! Frames go through a hand landmark detector, a translation-normalized
//! feature vector and a gesture classifier. In stream mode the per-frame
//! predictions are debounced into [`debounce::GestureEvent`]s and announced;
//! the single-shot endpoint returns one label per image.

pub mod announcer;
pub mod classifier;
pub mod config;
#[cfg(feature = "control")]
pub mod control;
pub mod debounce;
pub mod endpoint;
pub mod error;
pub mod features;
pub mod hand_landmarks;
pub mod labels;
pub mod overlay;
pub mod pipeline;
pub mod recording;
pub mod server;
pub mod utils;
#[cfg(feature = "webcam")]
pub mod webcam;

pub use error::{Error, Result};

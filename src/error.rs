use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A model or device could not be loaded. Fatal at startup.
    #[error("{capability} unavailable: {reason}")]
    CapabilityUnavailable {
        capability: &'static str,
        reason: String,
    },

    #[error("expected {expected} hand landmarks, got {actual}")]
    LandmarkShape { expected: usize, actual: usize },

    #[error("hand detection failed: {0}")]
    Detection(String),

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn unavailable(capability: &'static str, reason: impl ToString) -> Self {
        Error::CapabilityUnavailable {
            capability,
            reason: reason.to_string(),
        }
    }
}

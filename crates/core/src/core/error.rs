//! Error types for netviz.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VizError {
    /// A topic payload failed to parse or violates its schema.
    #[error("malformed payload on '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },

    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    /// A level change could not be applied because setup never completed.
    #[error("level {level} requested before setup completed (gave up after {attempts} attempts)")]
    PrematureInit { level: u32, attempts: u32 },

    /// A weight matrix, bias vector or frame disagrees with the declared shape.
    #[error("dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("no network structure configured for level {0}")]
    UnknownLevel(u32),

    #[error("render surface unavailable: {0}")]
    RenderSurfaceUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("model image: {0}")]
    ModelImage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VizError {
    pub(crate) fn malformed(topic: &str, reason: impl Into<String>) -> Self {
        VizError::MalformedPayload {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        VizError::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, VizError>;

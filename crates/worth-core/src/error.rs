use thiserror::Error;

/// Failure inside a face normalizer or embedder backend.
///
/// Unlike [`PredictError`]'s client-input variants this signals that the
/// service itself is broken (model file, inference runtime).
#[derive(Error, Debug)]
#[error("{backend}: {message}")]
pub struct ModelError {
    pub backend: &'static str,
    pub message: String,
}

impl ModelError {
    pub fn new(backend: &'static str, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }
}

/// Degenerate embedding produced by the embedder.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding has zero norm")]
    ZeroNorm,
    #[error("embedding contains non-finite values")]
    NonFinite,
    #[error("embedding has dimension {actual}, gallery expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Per-request prediction failure. Every variant is deterministic in the
/// input, so none is retried.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("invalid image file: {0}")]
    InvalidImage(#[from] image::ImageError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("degenerate embedding: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("similarity weights of the selected matches sum to zero")]
    DegenerateWeights,
    #[error("match index {index} is outside the gallery ({entries} entries)")]
    UnknownMatch { index: usize, entries: usize },
    #[error("model failure: {0}")]
    Model(#[from] ModelError),
}

impl PredictError {
    /// True for errors caused by the uploaded image rather than the service.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PredictError::Model(_) | PredictError::UnknownMatch { .. })
    }
}

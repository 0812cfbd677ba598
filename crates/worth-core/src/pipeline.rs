//! Prediction orchestration: image bytes → face → embedding → top-K → estimate.

use crate::error::{EmbeddingError, ModelError, PredictError};
use crate::estimator::estimate;
use crate::gallery::ReferenceGallery;
use crate::matcher::{CosineMatcher, Matcher, DEFAULT_TOP_K};
use crate::types::{AlignedFace, Embedding, PredictionResult, SimilarIndividual};
use image::RgbImage;
use std::sync::Arc;

/// Locates a face in an image and produces a fixed-size aligned crop.
pub trait FaceNormalizer {
    /// Return `Ok(None)` when the image holds no detectable face.
    fn normalize(&mut self, image: &RgbImage) -> Result<Option<AlignedFace>, ModelError>;
}

/// Maps an aligned face crop to a raw (not necessarily unit-length) vector.
pub trait Embedder {
    fn embed(&mut self, face: &AlignedFace) -> Result<Vec<f32>, ModelError>;

    /// Identifier of the underlying model, for status reporting.
    fn model_version(&self) -> &str {
        "unknown"
    }
}

impl<T: FaceNormalizer + ?Sized> FaceNormalizer for Box<T> {
    fn normalize(&mut self, image: &RgbImage) -> Result<Option<AlignedFace>, ModelError> {
        (**self).normalize(image)
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn embed(&mut self, face: &AlignedFace) -> Result<Vec<f32>, ModelError> {
        (**self).embed(face)
    }

    fn model_version(&self) -> &str {
        (**self).model_version()
    }
}

/// Runs the full prediction pipeline against a shared gallery.
///
/// Holds no per-request state; the normalizer and embedder need `&mut` only
/// because inference sessions do.
pub struct Predictor<N, E> {
    normalizer: N,
    embedder: E,
    gallery: Arc<ReferenceGallery>,
    top_k: usize,
}

impl<N: FaceNormalizer, E: Embedder> Predictor<N, E> {
    pub fn new(normalizer: N, embedder: E, gallery: Arc<ReferenceGallery>) -> Self {
        Self {
            normalizer,
            embedder,
            gallery,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Number of matches blended into the estimate (clamped to at least 1).
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn gallery(&self) -> &Arc<ReferenceGallery> {
        &self.gallery
    }

    pub fn normalizer(&self) -> &N {
        &self.normalizer
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Estimate a net worth from encoded image bytes (any format `image` decodes).
    pub fn predict(&mut self, image_bytes: &[u8]) -> Result<PredictionResult, PredictError> {
        let image = image::load_from_memory(image_bytes)?.to_rgb8();
        tracing::debug!(width = image.width(), height = image.height(), "decoded image");

        let face = self
            .normalizer
            .normalize(&image)?
            .ok_or(PredictError::NoFaceDetected)?;
        tracing::debug!(size = face.size, confidence = face.confidence, "face normalized");

        let raw = Embedding::new(self.embedder.embed(&face)?);
        let query = self.query_embedding(raw)?;

        let matches = CosineMatcher.top_k(&query, &self.gallery, self.top_k);
        let estimated_net_worth = estimate(&matches, &self.gallery)?;

        let matches: Vec<SimilarIndividual> = matches
            .iter()
            .filter_map(|m| {
                self.gallery.get(m.index).map(|entry| SimilarIndividual {
                    name: entry.name.clone(),
                    score: m.similarity,
                })
            })
            .collect();

        tracing::info!(
            estimate = estimated_net_worth,
            best = matches.first().map(|m| m.name.as_str()),
            best_score = matches.first().map(|m| m.score),
            "prediction complete"
        );

        Ok(PredictionResult {
            estimated_net_worth,
            matches,
        })
    }

    /// Validate and L2-normalize the embedder output.
    fn query_embedding(&self, raw: Embedding) -> Result<Embedding, EmbeddingError> {
        let expected = self.gallery.dim();
        if raw.dim() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: raw.dim(),
            });
        }
        if !raw.is_finite() {
            return Err(EmbeddingError::NonFinite);
        }
        raw.l2_normalized().ok_or(EmbeddingError::ZeroNorm)
    }
}

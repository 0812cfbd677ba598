//! worth-core — Net worth estimation from face similarity.
//!
//! Matches a query face embedding against a static reference gallery with
//! cosine similarity and blends the net worths of the top-K matches,
//! weighted by similarity. Face detection and embedding are consumed through
//! the [`FaceNormalizer`] and [`Embedder`] capability traits.

pub mod error;
pub mod estimator;
pub mod fake;
pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod types;

pub use error::{EmbeddingError, ModelError, PredictError};
pub use estimator::estimate;
pub use gallery::{GalleryEntry, GalleryLoadError, NormPolicy, ReferenceGallery};
pub use matcher::{CosineMatcher, MatchResult, Matcher, DEFAULT_TOP_K};
pub use pipeline::{Embedder, FaceNormalizer, Predictor};
pub use types::{AlignedFace, Embedding, PredictionResult, SimilarIndividual};

//! worth-models — ONNX face detection and embedding backends.
//!
//! Implements the `worth-core` capability traits: [`OnnxFaceNormalizer`]
//! (SCRFD detection plus cropping) and [`OnnxEmbedder`].

pub mod alignment;
pub mod detector;
pub mod recognizer;

pub use alignment::AlignMode;
pub use detector::{DetectorError, FaceDetector};
pub use recognizer::{FaceRecognizer, PixelNorm, RecognizerError};

use image::RgbImage;
use std::path::{Path, PathBuf};
use worth_core::{AlignedFace, Embedder, FaceNormalizer, ModelError};

/// File name of the SCRFD detector inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the embedding model inside the model directory.
pub const EMBEDDER_MODEL_FILE: &str = "facenet_vggface2.onnx";

impl From<DetectorError> for ModelError {
    fn from(e: DetectorError) -> Self {
        ModelError::new("scrfd", e.to_string())
    }
}

impl From<RecognizerError> for ModelError {
    fn from(e: RecognizerError) -> Self {
        ModelError::new("embedder", e.to_string())
    }
}

/// Settings shared by the production normalizer and embedder.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub model_dir: PathBuf,
    /// Side of the square face crop fed to the embedder.
    pub image_size: u32,
    /// Extra border around the face, in output pixels.
    pub margin: u32,
    pub align: AlignMode,
    pub detection_threshold: f32,
    pub pixel_norm: PixelNorm,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            image_size: 160,
            margin: 0,
            align: AlignMode::Crop,
            detection_threshold: detector::DEFAULT_CONFIDENCE_THRESHOLD,
            pixel_norm: PixelNorm::FACENET,
        }
    }
}

impl ModelOptions {
    pub fn detector_path(&self) -> PathBuf {
        self.model_dir.join(DETECTOR_MODEL_FILE)
    }

    pub fn embedder_path(&self) -> PathBuf {
        self.model_dir.join(EMBEDDER_MODEL_FILE)
    }
}

/// SCRFD detection followed by cropping the most confident face.
pub struct OnnxFaceNormalizer {
    detector: FaceDetector,
    image_size: u32,
    margin: u32,
    align: AlignMode,
}

impl OnnxFaceNormalizer {
    pub fn load(options: &ModelOptions) -> Result<Self, DetectorError> {
        Ok(Self {
            detector: FaceDetector::load(&options.detector_path(), options.detection_threshold)?,
            image_size: options.image_size,
            margin: options.margin,
            align: options.align,
        })
    }
}

impl FaceNormalizer for OnnxFaceNormalizer {
    fn normalize(&mut self, image: &RgbImage) -> Result<Option<AlignedFace>, ModelError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };

        tracing::debug!(
            candidates = faces.len(),
            confidence = face.confidence,
            x = face.x,
            y = face.y,
            width = face.width,
            height = face.height,
            "selected face"
        );

        let crop = alignment::extract_face(image, face, self.align, self.image_size, self.margin);
        Ok(Some(AlignedFace {
            pixels: crop.into_raw(),
            size: self.image_size,
            confidence: face.confidence,
        }))
    }
}

/// ONNX embedding model behind the [`Embedder`] trait.
pub struct OnnxEmbedder {
    recognizer: FaceRecognizer,
}

impl OnnxEmbedder {
    pub fn load(options: &ModelOptions) -> Result<Self, RecognizerError> {
        Ok(Self {
            recognizer: FaceRecognizer::load(
                &options.embedder_path(),
                options.image_size,
                options.pixel_norm,
            )?,
        })
    }

    pub fn from_path(path: &Path, options: &ModelOptions) -> Result<Self, RecognizerError> {
        Ok(Self {
            recognizer: FaceRecognizer::load(path, options.image_size, options.pixel_norm)?,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&mut self, face: &AlignedFace) -> Result<Vec<f32>, ModelError> {
        Ok(self.recognizer.extract(face)?)
    }

    fn model_version(&self) -> &str {
        self.recognizer.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_match_reference_deployment() {
        let opts = ModelOptions::default();
        assert_eq!(opts.image_size, 160);
        assert_eq!(opts.margin, 0);
        assert_eq!(opts.align, AlignMode::Crop);
        assert_eq!(opts.detector_path(), PathBuf::from("models/det_10g.onnx"));
        assert_eq!(opts.embedder_path(), PathBuf::from("models/facenet_vggface2.onnx"));
    }

    #[test]
    fn test_missing_detector_model() {
        let opts = ModelOptions {
            model_dir: PathBuf::from("/nonexistent"),
            ..ModelOptions::default()
        };
        assert!(matches!(
            OnnxFaceNormalizer::load(&opts),
            Err(DetectorError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_error_conversion_names_backend() {
        let e: ModelError = RecognizerError::InputSize { expected: 160, actual: 112 }.into();
        assert_eq!(e.backend, "embedder");
        assert!(e.to_string().contains("160"));
    }
}

//! Face embedder via ONNX Runtime.
//!
//! Runs a FaceNet/ArcFace-style model on a square RGB face crop and returns
//! its raw output vector. L2 normalization is left to the caller.

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;
use worth_core::AlignedFace;

/// Pixel normalization `(p - mean) / std` applied before inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelNorm {
    pub mean: f32,
    pub std: f32,
}

impl PixelNorm {
    /// FaceNet (InceptionResnetV1) fixed image standardization.
    pub const FACENET: PixelNorm = PixelNorm { mean: 127.5, std: 128.0 };
    /// ArcFace symmetric normalization.
    pub const ARCFACE: PixelNorm = PixelNorm { mean: 127.5, std: 127.5 };
}

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop is {actual}px, model expects {expected}px")]
    InputSize { expected: u32, actual: u32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ONNX face embedding model.
pub struct FaceRecognizer {
    session: Session,
    input_size: u32,
    norm: PixelNorm,
    version: String,
}

impl FaceRecognizer {
    /// Load an embedding model that takes `input_size`×`input_size` RGB crops.
    pub fn load(model_path: &Path, input_size: u32, norm: PixelNorm) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let version = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::info!(
            path = %model_path.display(),
            input_size,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self {
            session,
            input_size,
            norm,
            version,
        })
    }

    /// Model identifier derived from the file name (e.g. "facenet_vggface2").
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Extract the raw embedding for an aligned face crop.
    pub fn extract(&mut self, face: &AlignedFace) -> Result<Vec<f32>, RecognizerError> {
        if face.size != self.input_size {
            return Err(RecognizerError::InputSize {
                expected: self.input_size,
                actual: face.size,
            });
        }

        let input = preprocess(face, self.norm);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.is_empty() {
            return Err(RecognizerError::InferenceFailed("model returned an empty embedding".into()));
        }

        Ok(raw.to_vec())
    }
}

/// Convert an interleaved RGB crop into a normalized NCHW tensor.
fn preprocess(face: &AlignedFace, norm: PixelNorm) -> Array4<f32> {
    let size = face.size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (i, rgb) in face.pixels.chunks_exact(3).take(size * size).enumerate() {
        let (y, x) = (i / size, i % size);
        for (c, &value) in rgb.iter().enumerate() {
            tensor[[0, c, y, x]] = (value as f32 - norm.mean) / norm.std;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(size: u32, rgb: [u8; 3]) -> AlignedFace {
        AlignedFace {
            pixels: rgb.repeat((size * size) as usize),
            size,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_preprocess_output_shape() {
        let tensor = preprocess(&face(160, [128, 128, 128]), PixelNorm::FACENET);
        assert_eq!(tensor.shape(), &[1, 3, 160, 160]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let tensor = preprocess(&face(4, [128, 128, 128]), PixelNorm::ARCFACE);
        let expected = (128.0 - 127.5) / 127.5;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let tensor = preprocess(&face(4, [255, 127, 0]), PixelNorm::FACENET);
        for y in 0..4 {
            for x in 0..4 {
                assert!((tensor[[0, 0, y, x]] - 127.5 / 128.0).abs() < 1e-6);
                assert!((tensor[[0, 1, y, x]] + 0.5 / 128.0).abs() < 1e-6);
                assert!((tensor[[0, 2, y, x]] + 127.5 / 128.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_preprocess_short_buffer_zero_fills() {
        let mut f = face(4, [200, 200, 200]);
        f.pixels.truncate(3 * 5);
        let tensor = preprocess(&f, PixelNorm::FACENET);
        assert!(tensor[[0, 0, 1, 0]] > 0.0);
        assert_eq!(tensor[[0, 0, 1, 1]], 0.0);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceRecognizer::load(Path::new("/nonexistent/facenet.onnx"), 160, PixelNorm::FACENET)
            .err()
            .unwrap();
        assert!(matches!(err, RecognizerError::ModelNotFound(_)));
    }
}

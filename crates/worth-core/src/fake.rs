//! Deterministic stand-ins for the model capabilities.
//!
//! Let the pipeline and the serving layer run without any model files.

use crate::error::ModelError;
use crate::pipeline::{Embedder, FaceNormalizer};
use crate::types::AlignedFace;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

enum NormalizerMode {
    Face(u32),
    NoFace,
    Fail(String),
}

/// Normalizer that ignores image content.
pub struct FixedNormalizer {
    mode: NormalizerMode,
    calls: usize,
}

impl FixedNormalizer {
    /// Always "finds" a face and returns a mid-gray `size`×`size` crop.
    pub fn face(size: u32) -> Self {
        Self {
            mode: NormalizerMode::Face(size),
            calls: 0,
        }
    }

    /// Never finds a face.
    pub fn no_face() -> Self {
        Self {
            mode: NormalizerMode::NoFace,
            calls: 0,
        }
    }

    /// Always fails as a broken backend would.
    pub fn failing(message: &str) -> Self {
        Self {
            mode: NormalizerMode::Fail(message.to_string()),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl FaceNormalizer for FixedNormalizer {
    fn normalize(&mut self, _image: &RgbImage) -> Result<Option<AlignedFace>, ModelError> {
        self.calls += 1;
        match &self.mode {
            NormalizerMode::Face(size) => Ok(Some(AlignedFace {
                pixels: vec![128; (*size as usize) * (*size as usize) * 3],
                size: *size,
                confidence: 1.0,
            })),
            NormalizerMode::NoFace => Ok(None),
            NormalizerMode::Fail(message) => Err(ModelError::new("fake", message.clone())),
        }
    }
}

/// Embedder that returns the same vector for every face.
pub struct FixedEmbedder {
    vector: Vec<f32>,
    calls: usize,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector, calls: 0 }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Embedder for FixedEmbedder {
    fn embed(&mut self, _face: &AlignedFace) -> Result<Vec<f32>, ModelError> {
        self.calls += 1;
        Ok(self.vector.clone())
    }

    fn model_version(&self) -> &str {
        "fixed"
    }
}

/// Encode a small gradient image as PNG.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    // Writing PNG into memory has no failure path for a well-formed buffer.
    if let Err(e) = image.write_to(&mut buf, ImageFormat::Png) {
        tracing::error!(error = %e, "failed to encode sample image");
    }
    buf.into_inner()
}

//! Reference gallery: the static table of (name, embedding, net worth) rows
//! queried at prediction time.
//!
//! The on-disk format is a JSON object holding three aligned arrays:
//!
//! ```json
//! { "embedding": [[0.1, ...], ...], "name": ["..."], "net worth": [512000.0] }
//! ```

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Maximum tolerated deviation of a stored embedding's norm from 1.0.
pub const NORM_TOLERANCE: f32 = 1e-3;

#[derive(Error, Debug)]
pub enum GalleryLoadError {
    #[error("failed to read gallery {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed gallery: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("gallery is empty")]
    Empty,
    #[error("gallery arrays differ in length: {embeddings} embeddings, {names} names, {net_worths} net worths")]
    LengthMismatch {
        embeddings: usize,
        names: usize,
        net_worths: usize,
    },
    #[error("entry {index} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("entry {index} has zero-dimension embedding")]
    ZeroDimension { index: usize },
    #[error("entry {index} contains a non-finite value")]
    NonFinite { index: usize },
    #[error("entry {index} has zero-norm embedding")]
    ZeroNorm { index: usize },
    #[error("entry {index} has norm {norm}, outside tolerance of unit length")]
    NormDrift { index: usize, norm: f32 },
}

/// How stored embedding norms are treated at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormPolicy {
    /// Keep stored vectors as-is; drift is only logged.
    #[default]
    Trust,
    /// Divide every stored vector by its norm.
    Renormalize,
    /// Fail the load if any vector drifts beyond [`NORM_TOLERANCE`].
    Strict,
}

impl FromStr for NormPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trust" => Ok(Self::Trust),
            "renormalize" => Ok(Self::Renormalize),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown norm policy: {other}")),
        }
    }
}

/// Raw on-disk layout. Field names must stay byte-compatible with existing
/// generated galleries.
#[derive(Debug, Serialize, Deserialize)]
pub struct GallerySource {
    pub embedding: Vec<Vec<f32>>,
    pub name: Vec<String>,
    #[serde(rename = "net worth")]
    pub net_worth: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
    pub net_worth: f64,
}

/// Norm statistics over all stored embeddings, computed at load.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NormStats {
    pub min: f32,
    pub max: f32,
    /// Entries whose norm deviates from 1.0 by more than [`NORM_TOLERANCE`].
    pub drifted: usize,
}

/// Immutable, non-empty gallery with a fixed embedding dimension.
#[derive(Debug)]
pub struct ReferenceGallery {
    entries: Vec<GalleryEntry>,
    dim: usize,
    fingerprint: String,
    norm_stats: NormStats,
}

impl ReferenceGallery {
    /// Load a gallery from a JSON file.
    pub fn load(path: impl AsRef<Path>, policy: NormPolicy) -> Result<Self, GalleryLoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| GalleryLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let gallery = Self::from_json_slice(&bytes, policy)?;

        tracing::info!(
            path = %path.display(),
            entries = gallery.len(),
            dim = gallery.dim,
            fingerprint = %gallery.fingerprint,
            ?policy,
            "loaded reference gallery"
        );

        Ok(gallery)
    }

    /// Parse a gallery from raw JSON bytes.
    pub fn from_json_slice(bytes: &[u8], policy: NormPolicy) -> Result<Self, GalleryLoadError> {
        let source: GallerySource = serde_json::from_slice(bytes)?;
        let fingerprint = hex_digest(bytes);
        Self::build(source, policy, fingerprint)
    }

    /// Build a gallery from in-memory entries (fingerprint is computed over
    /// the canonical JSON encoding).
    pub fn from_entries(
        entries: Vec<GalleryEntry>,
        policy: NormPolicy,
    ) -> Result<Self, GalleryLoadError> {
        let mut source = GallerySource {
            embedding: Vec::with_capacity(entries.len()),
            name: Vec::with_capacity(entries.len()),
            net_worth: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            source.embedding.push(entry.embedding.values);
            source.name.push(entry.name);
            source.net_worth.push(entry.net_worth);
        }
        let fingerprint = hex_digest(&serde_json::to_vec(&source)?);
        Self::build(source, policy, fingerprint)
    }

    fn build(
        source: GallerySource,
        policy: NormPolicy,
        fingerprint: String,
    ) -> Result<Self, GalleryLoadError> {
        let GallerySource {
            embedding,
            name,
            net_worth,
        } = source;

        if embedding.len() != name.len() || embedding.len() != net_worth.len() {
            return Err(GalleryLoadError::LengthMismatch {
                embeddings: embedding.len(),
                names: name.len(),
                net_worths: net_worth.len(),
            });
        }
        if embedding.is_empty() {
            return Err(GalleryLoadError::Empty);
        }

        let dim = embedding[0].len();
        if dim == 0 {
            return Err(GalleryLoadError::ZeroDimension { index: 0 });
        }

        let mut stats = NormStats {
            min: f32::INFINITY,
            max: 0.0,
            drifted: 0,
        };
        let mut entries = Vec::with_capacity(embedding.len());

        for (index, ((values, name), net_worth)) in
            embedding.into_iter().zip(name).zip(net_worth).enumerate()
        {
            if values.len() != dim {
                return Err(GalleryLoadError::DimensionMismatch {
                    index,
                    expected: dim,
                    actual: values.len(),
                });
            }

            let embedding = Embedding::new(values);
            if !embedding.is_finite() || !net_worth.is_finite() {
                return Err(GalleryLoadError::NonFinite { index });
            }

            let norm = embedding.norm();
            if norm == 0.0 {
                return Err(GalleryLoadError::ZeroNorm { index });
            }
            stats.min = stats.min.min(norm);
            stats.max = stats.max.max(norm);

            let drifted = (norm - 1.0).abs() > NORM_TOLERANCE;
            let embedding = if drifted {
                stats.drifted += 1;
                match policy {
                    NormPolicy::Trust => embedding,
                    NormPolicy::Renormalize => embedding
                        .l2_normalized()
                        .ok_or(GalleryLoadError::ZeroNorm { index })?,
                    NormPolicy::Strict => {
                        return Err(GalleryLoadError::NormDrift { index, norm });
                    }
                }
            } else {
                embedding
            };

            entries.push(GalleryEntry {
                name,
                embedding,
                net_worth,
            });
        }

        if stats.drifted > 0 {
            tracing::warn!(
                drifted = stats.drifted,
                min_norm = stats.min,
                max_norm = stats.max,
                ?policy,
                "gallery embeddings are not unit length"
            );
        }

        Ok(Self {
            entries,
            dim,
            fingerprint,
            norm_stats: stats,
        })
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&GalleryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a successfully built gallery.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension shared by every entry.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Hex SHA-256 of the source the gallery was built from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn norm_stats(&self) -> NormStats {
        self.norm_stats
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

use serde::{Deserialize, Serialize};

/// Face embedding vector (512-dimensional for the reference gallery).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean (L2) norm.
    ///
    /// Accumulated in f64 so large but finite components cannot overflow the
    /// sum of squares.
    pub fn norm(&self) -> f32 {
        self.norm_f64() as f32
    }

    fn norm_f64(&self) -> f64 {
        self.values
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. The full cosine
    /// formula is used even for unit vectors so a drifted norm on either side
    /// cannot bias the score. A zero-norm input scores 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(a), f64::from(b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 && denom.is_finite() {
            (dot / denom) as f32
        } else {
            0.0
        }
    }

    /// Return a unit-L2-norm copy, or `None` if the norm is zero or not finite.
    ///
    /// The norm of any finite vector is finite here, so `None` for a finite
    /// input always means a zero vector.
    pub fn l2_normalized(&self) -> Option<Embedding> {
        let norm = self.norm_f64();
        if norm > 0.0 && norm.is_finite() {
            Some(Embedding {
                values: self
                    .values
                    .iter()
                    .map(|&x| (f64::from(x) / norm) as f32)
                    .collect(),
            })
        } else {
            None
        }
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// A square RGB face crop produced by a face normalizer, ready for embedding.
#[derive(Debug, Clone)]
pub struct AlignedFace {
    /// Interleaved RGB pixels, `size * size * 3` bytes.
    pub pixels: Vec<u8>,
    pub size: u32,
    /// Detector confidence for the face this crop came from.
    pub confidence: f32,
}

/// One ranked gallery identity in a prediction response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarIndividual {
    pub name: String,
    pub score: f32,
}

/// Output of one prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub estimated_net_worth: f64,
    #[serde(rename = "similar_individuals")]
    pub matches: Vec<SimilarIndividual>,
}

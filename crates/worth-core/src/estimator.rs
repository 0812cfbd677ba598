//! Similarity-weighted net worth aggregation.

use crate::error::PredictError;
use crate::gallery::ReferenceGallery;
use crate::matcher::MatchResult;

/// Blend the net worths of the selected matches, weighting each by its
/// similarity: `Σ(sim_i × worth_i) / Σ(sim_i)`.
///
/// Negative similarities are used as-is, so the result can fall outside the
/// range of the selected net worths. A zero weight sum (including an empty
/// match list) is rejected with [`PredictError::DegenerateWeights`]. Every
/// match must index into `gallery`.
pub fn estimate(matches: &[MatchResult], gallery: &ReferenceGallery) -> Result<f64, PredictError> {
    let mut weighted = 0.0f64;
    let mut total = 0.0f64;

    for m in matches {
        let entry = gallery.get(m.index).ok_or(PredictError::UnknownMatch {
            index: m.index,
            entries: gallery.len(),
        })?;
        let weight = f64::from(m.similarity);
        weighted += weight * entry.net_worth;
        total += weight;
    }

    if total == 0.0 {
        return Err(PredictError::DegenerateWeights);
    }

    Ok(weighted / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{GalleryEntry, NormPolicy};
    use crate::types::Embedding;

    fn gallery(worths: &[f64]) -> ReferenceGallery {
        let entries = worths
            .iter()
            .enumerate()
            .map(|(i, &net_worth)| {
                let mut values = vec![0.0; worths.len()];
                values[i] = 1.0;
                GalleryEntry {
                    name: format!("p{i}"),
                    embedding: Embedding::new(values),
                    net_worth,
                }
            })
            .collect();
        ReferenceGallery::from_entries(entries, NormPolicy::Trust).unwrap()
    }

    fn m(index: usize, similarity: f32) -> MatchResult {
        MatchResult { index, similarity }
    }

    #[test]
    fn test_weighted_average_scenario() {
        let g = gallery(&[100.0, 200.0, 300.0]);
        let est = estimate(&[m(0, 1.0), m(2, 0.6)], &g).unwrap();
        assert!((est - 175.0).abs() < 1e-4, "got {est}");
    }

    #[test]
    fn test_single_match_returns_its_worth() {
        let g = gallery(&[42_000.0]);
        assert!((estimate(&[m(0, 0.3)], &g).unwrap() - 42_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_convex_when_non_negative() {
        let g = gallery(&[100.0, 500.0, 900.0]);
        let est = estimate(&[m(0, 0.9), m(1, 0.5), m(2, 0.0)], &g).unwrap();
        assert!((100.0..=900.0).contains(&est));
        // 0.9*100 + 0.5*500 = 340 / 1.4
        assert!((est - 340.0 / 1.4).abs() < 1e-4);
    }

    #[test]
    fn test_negative_similarity_not_clamped() {
        let g = gallery(&[100.0, 200.0]);
        // (0.5*100 + -0.25*200) / 0.25 = 0
        let est = estimate(&[m(0, 0.5), m(1, -0.25)], &g).unwrap();
        assert!(est.abs() < 1e-6, "got {est}");
        assert!(est < 100.0);
    }

    #[test]
    fn test_negative_sum_flips_direction() {
        let g = gallery(&[100.0, 200.0]);
        // (-0.5*100 + -0.25*200) / -0.75 = 133.33
        let est = estimate(&[m(0, -0.5), m(1, -0.25)], &g).unwrap();
        assert!((est - 100.0 / 0.75).abs() < 1e-4, "got {est}");
    }

    #[test]
    fn test_zero_sum_is_degenerate() {
        let g = gallery(&[100.0, 200.0]);
        assert!(matches!(
            estimate(&[m(0, 0.5), m(1, -0.5)], &g),
            Err(PredictError::DegenerateWeights)
        ));
        assert!(matches!(
            estimate(&[m(0, 0.0), m(1, 0.0)], &g),
            Err(PredictError::DegenerateWeights)
        ));
    }

    #[test]
    fn test_empty_matches_is_degenerate() {
        let g = gallery(&[100.0]);
        assert!(matches!(estimate(&[], &g), Err(PredictError::DegenerateWeights)));
    }

    #[test]
    fn test_unknown_index_is_rejected() {
        let g = gallery(&[100.0, 200.0]);
        let err = estimate(&[m(0, 0.9), m(5, 0.8)], &g).unwrap_err();
        assert!(matches!(err, PredictError::UnknownMatch { index: 5, entries: 2 }));
        assert!(!err.is_client_error());
    }
}

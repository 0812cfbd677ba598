use crate::gallery::ReferenceGallery;
use crate::types::Embedding;

/// Number of gallery matches blended into an estimate unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 3;

/// One scored gallery row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Index into the gallery.
    pub index: usize,
    /// Cosine similarity [-1, 1].
    pub similarity: f32,
}

/// Strategy for ranking gallery entries against a query embedding.
pub trait Matcher {
    /// Return the `min(k, N)` best entries, highest similarity first.
    fn top_k(&self, query: &Embedding, gallery: &ReferenceGallery, k: usize) -> Vec<MatchResult>;
}

/// Cosine similarity matcher over the full gallery.
///
/// Scores every entry, then stable-sorts so equal scores keep their
/// gallery order.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn top_k(&self, query: &Embedding, gallery: &ReferenceGallery, k: usize) -> Vec<MatchResult> {
        let mut scored: Vec<MatchResult> = gallery
            .entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| MatchResult {
                index,
                similarity: query.similarity(&entry.embedding),
            })
            .collect();

        // sort_by is stable: ties stay in insertion order.
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{GalleryEntry, NormPolicy};

    fn gallery(rows: &[(&str, &[f32], f64)]) -> ReferenceGallery {
        let entries = rows
            .iter()
            .map(|(name, values, worth)| GalleryEntry {
                name: name.to_string(),
                embedding: Embedding::new(values.to_vec()),
                net_worth: *worth,
            })
            .collect();
        ReferenceGallery::from_entries(entries, NormPolicy::Trust).unwrap()
    }

    fn query(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_top_k_scenario() {
        let g = gallery(&[
            ("a", &[1.0, 0.0], 100.0),
            ("b", &[0.0, 1.0], 200.0),
            ("c", &[0.6, 0.8], 300.0),
        ]);
        let matches = CosineMatcher.top_k(&query(&[1.0, 0.0]), &g, 2);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].index, 0);
        assert!((matches[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(matches[1].index, 2);
        assert!((matches[1].similarity - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_top_k_scans_whole_gallery() {
        // Best match is the last entry.
        let g = gallery(&[
            ("decoy1", &[0.0, 1.0, 0.0], 1.0),
            ("decoy2", &[0.0, 0.0, 1.0], 2.0),
            ("match", &[1.0, 0.0, 0.0], 3.0),
        ]);
        let matches = CosineMatcher.top_k(&query(&[1.0, 0.0, 0.0]), &g, 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(g.entries()[matches[0].index].name, "match");
    }

    #[test]
    fn test_top_k_fewer_entries_than_k() {
        let g = gallery(&[("a", &[1.0, 0.0], 1.0), ("b", &[0.0, 1.0], 2.0)]);
        let matches = CosineMatcher.top_k(&query(&[1.0, 0.0]), &g, DEFAULT_TOP_K);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_top_k_zero() {
        let g = gallery(&[("a", &[1.0, 0.0], 1.0)]);
        assert!(CosineMatcher.top_k(&query(&[1.0, 0.0]), &g, 0).is_empty());
    }

    #[test]
    fn test_ties_keep_gallery_order() {
        let g = gallery(&[
            ("low", &[0.0, 1.0], 1.0),
            ("tie1", &[1.0, 0.0], 2.0),
            ("tie2", &[1.0, 0.0], 3.0),
            ("tie3", &[1.0, 0.0], 4.0),
        ]);
        let matches = CosineMatcher.top_k(&query(&[1.0, 0.0]), &g, 3);
        let order: Vec<usize> = matches.iter().map(|m| m.index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_negative_similarities_ranked() {
        let g = gallery(&[
            ("opposite", &[-1.0, 0.0], 1.0),
            ("slightly", &[-0.6, 0.8], 2.0),
        ]);
        let matches = CosineMatcher.top_k(&query(&[1.0, 0.0]), &g, 2);
        assert_eq!(matches[0].index, 1);
        assert!((matches[0].similarity + 0.6).abs() < 1e-6);
        assert_eq!(matches[1].index, 0);
        assert!((matches[1].similarity + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_random_gallery_properties() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        for n in 1..20 {
            let entries = (0..n)
                .map(|i| GalleryEntry {
                    name: format!("p{i}"),
                    embedding: Embedding::new((0..8).map(|_| rng.gen_range(-1.0..1.0)).collect())
                        .l2_normalized()
                        .unwrap(),
                    net_worth: rng.gen_range(1.0..1_000_000.0),
                })
                .collect::<Vec<_>>();
            let g = ReferenceGallery::from_entries(entries, NormPolicy::Trust).unwrap();

            let target = rng.gen_range(0..n);
            let q = g.entries()[target].embedding.clone();

            for k in 1..6 {
                let matches = CosineMatcher.top_k(&q, &g, k);
                assert_eq!(matches.len(), k.min(n));
                assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
                // Identical embedding scores 1.0 and leads the ranking.
                assert!((matches[0].similarity - 1.0).abs() < 1e-5);
                assert!((g.entries()[matches[0].index].embedding.similarity(&q) - 1.0).abs() < 1e-5);
            }
        }
    }
}

//! Exhaustive cosine-similarity search.

/// A row of the store paired with its similarity to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the row in insertion order.
    pub row: usize,
    pub similarity: f32,
}

/// A search strategy over the rows of a store.
///
/// Implementations return at most `k` neighbors among rows for which
/// `eligible(row)` holds, sorted by descending similarity with ties going to
/// the earlier row.
pub trait NearestNeighbors {
    fn nearest(&self, query: &[f32], k: usize, eligible: &dyn Fn(usize) -> bool) -> Vec<Neighbor>;
}

/// Cosine similarity `(a·b) / (‖a‖‖b‖)`, or `0.0` when either norm is zero
/// or the lengths differ. Accumulates in `f64`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    clamp_unit(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

pub(crate) fn clamp_unit(value: f64) -> f32 {
    value.clamp(-1.0, 1.0) as f32
}

/// Scores every eligible row and sorts.
pub struct BruteForce<'a> {
    vectors: &'a [Vec<f32>],
}

impl<'a> BruteForce<'a> {
    pub fn new(vectors: &'a [Vec<f32>]) -> Self {
        Self { vectors }
    }
}

impl NearestNeighbors for BruteForce<'_> {
    fn nearest(&self, query: &[f32], k: usize, eligible: &dyn Fn(usize) -> bool) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(row, _)| eligible(*row))
            .map(|(row, v)| Neighbor {
                row,
                similarity: cosine_similarity(query, v),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

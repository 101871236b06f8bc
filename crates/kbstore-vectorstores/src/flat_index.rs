//! Exact inner-product index over L2-normalized rows.
//!
//! Rows are normalized once at build time and laid out contiguously, so a
//! query costs one dot product per row and a bounded heap instead of a full
//! sort. The index is a snapshot: the owning store drops it whenever rows
//! change and builds a fresh one on the next indexed search.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::similarity::{clamp_unit, Neighbor, NearestNeighbors};

pub struct FlatIndex {
    dimension: usize,
    len: usize,
    /// Row-major `len * dimension` matrix of unit vectors. Zero rows stay zero.
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build an index over `vectors`. All rows must share one dimensionality;
    /// the store guarantees this on insert.
    pub fn build(vectors: &[Vec<f32>]) -> Self {
        let dimension = vectors.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(vectors.len() * dimension);

        for v in vectors {
            let norm = l2_norm(v);
            if norm == 0.0 {
                data.extend(std::iter::repeat(0.0).take(dimension));
            } else {
                data.extend(v.iter().map(|x| (f64::from(*x) / norm) as f32));
            }
        }

        Self {
            dimension,
            len: vectors.len(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Top `k` rows over the whole index.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || self.len == 0 || query.len() != self.dimension {
            return Vec::new();
        }

        let query_norm = l2_norm(query);

        // Min-heap of size k. Among equal scores the later row sorts lower,
        // so it is the one evicted.
        let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, Reverse<usize>)>> =
            BinaryHeap::with_capacity(k + 1);
        for row in 0..self.len {
            let similarity = if query_norm == 0.0 {
                0.0
            } else {
                clamp_unit(self.dot(row, query) / query_norm)
            };
            heap.push(Reverse((OrderedFloat(similarity), Reverse(row))));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut hits: Vec<Neighbor> = heap
            .into_iter()
            .map(|Reverse((score, Reverse(row)))| Neighbor {
                row,
                similarity: score.0,
            })
            .collect();
        hits.sort_unstable_by(|a, b| {
            OrderedFloat(b.similarity)
                .cmp(&OrderedFloat(a.similarity))
                .then(a.row.cmp(&b.row))
        });
        hits
    }

    fn dot(&self, row: usize, query: &[f32]) -> f64 {
        let start = row * self.dimension;
        self.data[start..start + self.dimension]
            .iter()
            .zip(query)
            .map(|(a, b)| f64::from(*a) * f64::from(*b))
            .sum()
    }
}

impl NearestNeighbors for FlatIndex {
    /// Post-filtered search: take the top candidates from the full index,
    /// drop ineligible rows, and double the candidate pool until `k`
    /// eligible rows are found or every row has been considered.
    fn nearest(&self, query: &[f32], k: usize, eligible: &dyn Fn(usize) -> bool) -> Vec<Neighbor> {
        if k == 0 || self.len == 0 {
            return Vec::new();
        }

        let mut pool = k.min(self.len);
        loop {
            let hits: Vec<Neighbor> = self
                .search(query, pool)
                .into_iter()
                .filter(|n| eligible(n.row))
                .take(k)
                .collect();
            if hits.len() == k || pool == self.len {
                return hits;
            }
            pool = pool.saturating_mul(2).min(self.len);
        }
    }
}

fn l2_norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}

// rust-cv/hnsw graph index over normalized embeddings

use ::hnsw::{Hnsw, Searcher};
use rand_pcg::Pcg64;
use space::{Metric, Neighbor};

use super::{check_query, AnnError, AnnIndex, SearchResult};
use crate::config::AnnBackendKind;

/// Cosine distance for unit vectors, `1 - dot` scaled to u32.
struct CosineDistance;

impl Metric<Box<[f32]>> for CosineDistance {
    type Unit = u32;

    fn distance(&self, a: &Box<[f32]>, b: &Box<[f32]>) -> u32 {
        let a_slice: &[f32] = a;
        let b_slice: &[f32] = b;

        let dot: f32 = a_slice
            .iter()
            .zip(b_slice.iter())
            .map(|(&x, &y)| x * y)
            .sum();

        // Distance is in [0, 2], so we scale by u32::MAX/2
        let distance = (1.0 - dot).clamp(0.0, 2.0);
        (distance * (u32::MAX as f32 / 2.0)) as u32
    }
}

/// HNSW index with M = 16, M0 = 32. The PRNG uses its default seed, so two
/// builds over the same items produce the same graph.
pub struct HnswIndex {
    index: Hnsw<CosineDistance, Box<[f32]>, Pcg64, 16, 32>,
    searcher: Searcher<u32>,
    /// HNSW item position -> entry id
    ids: Vec<i64>,
    dimensions: usize,
    ef_search: usize,
}

impl HnswIndex {
    /// `items` must already be normalized, of `dimensions` length and sorted
    /// by id.
    pub(super) fn build(dimensions: usize, items: Vec<(i64, Vec<f32>)>, ef_search: usize) -> Self {
        let mut index = Hnsw::new(CosineDistance);
        let mut searcher = Searcher::default();
        let mut ids = Vec::with_capacity(items.len());

        for (id, embedding) in items {
            index.insert(embedding.into_boxed_slice(), &mut searcher);
            ids.push(id);
        }

        Self {
            index,
            searcher,
            ids,
            dimensions,
            ef_search,
        }
    }
}

impl AnnIndex for HnswIndex {
    fn backend(&self) -> AnnBackendKind {
        AnnBackendKind::Hnsw
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn ids(&self) -> Vec<i64> {
        let mut ids = self.ids.clone();
        ids.sort_unstable();
        ids
    }

    fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, AnnError> {
        let query = check_query(self.dimensions, query)?;
        if self.ids.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let actual_k = k.min(self.ids.len());
        let mut neighbors = vec![
            Neighbor {
                index: !0,
                distance: !0
            };
            actual_k
        ];

        let ef_search = self.ef_search.max(actual_k);
        let query_box = query.into_boxed_slice();
        self.index
            .nearest(&query_box, ef_search, &mut self.searcher, &mut neighbors);

        let results = neighbors
            .into_iter()
            .filter(|n| n.index != !0)
            .filter_map(|n| {
                let id = *self.ids.get(n.index)?;
                let distance = (n.distance as f32) / (u32::MAX as f32 / 2.0);
                Some(SearchResult {
                    id,
                    score: (1.0 - distance).clamp(-1.0, 1.0),
                })
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(i: usize, dims: usize) -> Vec<f32> {
        let mut v = vec![0.05; dims];
        v[i % dims] = 1.0;
        let norm = super::super::l2_norm(&v);
        v.into_iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_finds_exact_member() {
        let items: Vec<(i64, Vec<f32>)> = (0..40).map(|i| (i as i64 + 100, unit(i, 8))).collect();
        let mut index = HnswIndex::build(8, items, 64);

        let hits = index.search(&unit(3, 8), 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert!([103, 111, 119, 127, 135].contains(&hits[0].id));
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn test_rebuild_has_same_members() {
        let items: Vec<(i64, Vec<f32>)> = (0..20).map(|i| (i as i64, unit(i, 4))).collect();
        let a = HnswIndex::build(4, items.clone(), 32);
        let b = HnswIndex::build(4, items, 32);
        assert_eq!(a.ids(), b.ids());
    }
}

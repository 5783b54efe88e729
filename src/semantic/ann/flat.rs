//! Exhaustive cosine scan. Also used for brute-force search over stored
//! embeddings when no index is available.

use super::{check_query, AnnError, AnnIndex, SearchResult};
use crate::config::AnnBackendKind;

/// In-memory vector list searched by full scan.
pub struct FlatIndex {
    /// (entry id, normalized embedding), ascending by id
    entries: Vec<(i64, Vec<f32>)>,
    dimensions: usize,
}

impl FlatIndex {
    /// `items` must already be normalized, of `dimensions` length and sorted
    /// by id.
    pub(super) fn build(dimensions: usize, items: Vec<(i64, Vec<f32>)>) -> Self {
        Self {
            entries: items,
            dimensions,
        }
    }

    /// Build from raw vectors, normalizing and filtering them first.
    pub fn from_vectors(dimensions: usize, items: Vec<(i64, Vec<f32>)>) -> Self {
        Self::build(dimensions, super::prepare(dimensions, items))
    }
}

impl AnnIndex for FlatIndex {
    fn backend(&self) -> AnnBackendKind {
        AnnBackendKind::Flat
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn ids(&self) -> Vec<i64> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, AnnError> {
        let query = check_query(self.dimensions, query)?;

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|(id, embedding)| SearchResult {
                id: *id,
                score: query.iter().zip(embedding).map(|(a, b)| a * b).sum(),
            })
            .collect();

        // Sort by score descending; ties keep id order
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);

        Ok(results)
    }
}

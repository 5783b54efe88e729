//! Approximate nearest-neighbor index over entry embeddings.
//!
//! The index is a projection of the stored embeddings and is always rebuilt
//! from the full live set; it is never patched in place.
//!
//! - `flat`: exhaustive cosine scan
//! - `hnsw`: rust-cv/hnsw graph (feature `ann`)
//! - `storage`: binary artifact holding the vectors an index was built from

mod flat;
#[cfg(feature = "ann")]
mod hnsw;
mod storage;

pub use flat::FlatIndex;
#[cfg(feature = "ann")]
pub use hnsw::HnswIndex;
pub use storage::{AnnArtifact, ArtifactMeta, StorageError};

use crate::config::AnnBackendKind;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum AnnError {
    #[error("ANN backend unavailable: {0}")]
    Unavailable(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AnnError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AnnError::Unavailable(_))
    }
}

/// A ranked index hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: i64,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

/// A built index. Vectors are L2-normalized on the way in, so inner product
/// equals cosine similarity.
pub trait AnnIndex: Send {
    fn backend(&self) -> AnnBackendKind;

    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Member entry ids, ascending.
    fn ids(&self) -> Vec<i64>;

    /// Up to `k` nearest members, best first.
    fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, AnnError>;
}

/// Build an index of kind `kind` over `items`. Items with the wrong dimension
/// or a zero norm are skipped.
pub fn build_index(
    kind: AnnBackendKind,
    dimensions: usize,
    items: Vec<(i64, Vec<f32>)>,
    ef_search: usize,
) -> Result<Box<dyn AnnIndex>, AnnError> {
    let items = prepare(dimensions, items);

    match kind {
        AnnBackendKind::Disabled => Err(AnnError::Unavailable(
            "ann backend disabled in config".to_string(),
        )),
        AnnBackendKind::Flat => Ok(Box::new(FlatIndex::build(dimensions, items))),
        #[cfg(feature = "ann")]
        AnnBackendKind::Hnsw => Ok(Box::new(HnswIndex::build(dimensions, items, ef_search))),
        #[cfg(not(feature = "ann"))]
        AnnBackendKind::Hnsw => {
            let _ = ef_search;
            Err(AnnError::Unavailable(
                "hnsw backend not compiled in".to_string(),
            ))
        }
    }
}

/// Whether `kind` can be constructed in this build.
pub fn backend_available(kind: AnnBackendKind) -> bool {
    match kind {
        AnnBackendKind::Disabled => false,
        AnnBackendKind::Flat => true,
        AnnBackendKind::Hnsw => cfg!(feature = "ann"),
    }
}

pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize, drop unusable vectors, sort and dedup by id.
pub(crate) fn prepare(dimensions: usize, items: Vec<(i64, Vec<f32>)>) -> Vec<(i64, Vec<f32>)> {
    let mut prepared: Vec<(i64, Vec<f32>)> = items
        .into_iter()
        .filter_map(|(id, v)| {
            if v.len() != dimensions {
                log::warn!(
                    "skipping vector id={id}: dimension {} != {dimensions}",
                    v.len()
                );
                return None;
            }
            let norm = l2_norm(&v);
            if norm < f32::EPSILON {
                log::warn!("skipping zero-norm vector id={id}");
                return None;
            }
            Some((id, v.into_iter().map(|x| x / norm).collect()))
        })
        .collect();

    prepared.sort_by_key(|(id, _)| *id);
    prepared.dedup_by_key(|(id, _)| *id);
    prepared
}

pub(crate) fn check_query(dimensions: usize, query: &[f32]) -> Result<Vec<f32>, AnnError> {
    if query.len() != dimensions {
        return Err(AnnError::DimensionMismatch {
            expected: dimensions,
            got: query.len(),
        });
    }

    let norm = l2_norm(query);
    if norm < f32::EPSILON {
        return Err(AnnError::ZeroNormVector);
    }

    Ok(query.iter().map(|x| x / norm).collect())
}

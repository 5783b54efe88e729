//! Semantic matching over entry embeddings.
//!
//! # Architecture
//!
//! - `embeddings`: embedding providers (fastembed, hashed n-grams)
//! - `ann`: nearest-neighbor index backends and their on-disk artifact
//! - `service`: per-process model/index cache, embedding upkeep and the
//!   queue-driven index maintenance

pub mod ann;
pub mod embeddings;
mod service;

pub use embeddings::{Embedder, EmbeddingError};
pub use service::{
    content_hash, AnnStatus, ApplyReport, SemanticError, SemanticHit, SemanticService,
    SemanticStatus,
};

/// Default embedding model name; multilingual so en and zh share one space
pub const DEFAULT_MODEL: &str = "paraphrase-multilingual-minilm-l12-v2";

//! Embedding providers.
//!
//! - `FastEmbedder` wraps fastembed with lazy model download (feature
//!   `embeddings`)
//! - `NgramEmbedder` hashes character n-grams; deterministic and offline
//!
//! Every provider returns L2-normalized vectors of a fixed dimension.

use std::path::Path;
use std::sync::Arc;
#[cfg(feature = "embeddings")]
use std::{path::PathBuf, sync::Mutex, time::Duration};

/// Error type for embedding operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Embedding support not compiled in (model {0})")]
    NotCompiled(String),
}

impl EmbeddingError {
    /// Whether the model could not be loaded at all, as opposed to a
    /// failure while encoding.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, EmbeddingError::EmbeddingFailed(_))
    }
}

/// A text encoder producing fixed-length, L2-normalized vectors.
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    /// Embed `texts`, preserving order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Load the provider for `model_name`. Model files are cached under
/// `<cache_dir>/models`.
pub fn load_embedder(
    model_name: &str,
    cache_dir: &Path,
    download_timeout_secs: u64,
) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    if NgramEmbedder::handles(model_name) {
        return Ok(Arc::new(NgramEmbedder::default()));
    }

    #[cfg(feature = "embeddings")]
    {
        let timeout = Duration::from_secs(download_timeout_secs);
        let model = FastEmbedder::new(model_name, cache_dir.to_path_buf(), Some(timeout))?;
        Ok(Arc::new(model))
    }

    #[cfg(not(feature = "embeddings"))]
    {
        let _ = (cache_dir, download_timeout_secs);
        Err(EmbeddingError::NotCompiled(model_name.to_string()))
    }
}

pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

// ─── fastembed ────────────────────────────────────────────────────────────────

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
#[cfg(feature = "embeddings")]
pub struct FastEmbedder {
    model: Mutex<fastembed::TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

#[cfg(feature = "embeddings")]
impl FastEmbedder {
    /// Create the model, downloading it into `cache_dir/models` on first use.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        use fastembed::{InitOptions, TextEmbedding};

        let model_enum = Self::parse_model_name(model_name)?;
        let timeout = download_timeout.unwrap_or(Duration::from_secs(300));

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!(
            "loading embedding model '{model_name}' download_timeout={}s",
            timeout.as_secs()
        );
        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(false);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;
        log::info!("embedding model '{model_name}' ready dims={dimensions}");

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        use fastembed::EmbeddingModel;

        match name.to_lowercase().as_str() {
            "paraphrase-multilingual-minilm-l12-v2" | "paraphrasemlminilml12v2" => {
                Ok(EmbeddingModel::ParaphraseMLMiniLML12V2)
            }
            "paraphrase-multilingual-minilm-l12-v2-q" | "paraphrasemlminilml12v2q" => {
                Ok(EmbeddingModel::ParaphraseMLMiniLML12V2Q)
            }
            "multilingual-e5-small" | "multilinguale5small" => {
                Ok(EmbeddingModel::MultilingualE5Small)
            }
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(EmbeddingModel::BGEBaseENV15),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: paraphrase-multilingual-minilm-l12-v2, multilingual-e5-small, all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, ngram",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut fastembed::TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

#[cfg(feature = "embeddings")]
impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        Ok(embeddings.into_iter().map(l2_normalize).collect())
    }
}

// ─── hashed n-grams ───────────────────────────────────────────────────────────

const NGRAM_MODEL: &str = "ngram";
const NGRAM_DIMENSIONS: usize = 256;

/// Bag of hashed character uni-, bi- and trigrams over lowercased text.
///
/// Texts sharing surface fragments land close together; there is no
/// cross-language knowledge.
pub struct NgramEmbedder {
    dimensions: usize,
}

impl Default for NgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: NGRAM_DIMENSIONS,
        }
    }
}

impl NgramEmbedder {
    pub fn handles(model_name: &str) -> bool {
        model_name.eq_ignore_ascii_case(NGRAM_MODEL)
    }

    fn bucket(&self, gram: &[char]) -> usize {
        // FNV-1a, stable across runs and platforms
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for c in gram {
            for byte in (*c as u32).to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
        }
        (hash % self.dimensions as u64) as usize
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in text.to_lowercase().split_whitespace() {
            let chars: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for n in 1..=3 {
                for gram in chars.windows(n) {
                    if n == 1 && (gram[0] == '^' || gram[0] == '$') {
                        continue;
                    }
                    v[self.bucket(gram)] += 1.0;
                }
            }
        }
        l2_normalize(v)
    }
}

impl Embedder for NgramEmbedder {
    fn model_name(&self) -> &str {
        NGRAM_MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_ngram_is_deterministic_and_normalized() {
        let e = NgramEmbedder::default();
        let a = e.embed("resilient").unwrap();
        let b = e.embed("resilient").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_ngram_similarity_tracks_overlap() {
        let e = NgramEmbedder::default();
        let base = e.embed("resilient").unwrap();
        let near = e.embed("resilience").unwrap();
        let far = e.embed("umbrella").unwrap();

        assert!(cosine(&base, &near) > cosine(&base, &far));
    }

    #[test]
    fn test_batch_preserves_order() {
        let e = NgramEmbedder::default();
        let texts = vec!["坚韧".to_string(), "calm".to_string()];
        let batch = e.embed_batch(&texts).unwrap();

        assert_eq!(batch[0], e.embed("坚韧").unwrap());
        assert_eq!(batch[1], e.embed("calm").unwrap());
    }

    #[test]
    fn test_load_embedder_ngram() {
        let dir = tempfile::tempdir().unwrap();
        let e = load_embedder("NGRAM", dir.path(), 1).unwrap();
        assert_eq!(e.model_name(), "ngram");
    }

    #[test]
    fn test_unknown_model_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_embedder("nonexistent-model", dir.path(), 1).err().unwrap();
        assert!(err.is_unavailable());
    }

    // Requires model download - run with --ignored
    #[cfg(feature = "embeddings")]
    #[test]
    #[ignore = "requires model download"]
    fn test_multilingual_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = FastEmbedder::new(
            "paraphrase-multilingual-minilm-l12-v2",
            dir.path().to_path_buf(),
            None,
        )
        .unwrap();
        assert_eq!(model.dimensions(), 384);

        let en = model.embed("resilient").unwrap();
        let zh = model.embed("坚韧").unwrap();
        let other = model.embed("umbrella").unwrap();
        assert!(cosine(&en, &zh) > cosine(&en, &other));
    }
}

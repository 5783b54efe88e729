//! Semantic context shared by every command of a process.
//!
//! Holds the loaded embedding models and built ANN indexes, keyed by model
//! name, for the lifetime of the process:
//! - Loads each model once, on first use
//! - Keeps stored embeddings in step with entry text (content hash)
//! - Brute-force cosine search over stored embeddings
//! - ANN index rebuilds, persistence and queue-driven maintenance

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::ann::{
    self, AnnArtifact, AnnError, AnnIndex, ArtifactMeta, FlatIndex, SearchResult,
};
use super::embeddings::{load_embedder, Embedder, EmbeddingError};
use crate::config::{AnnConfig, Config, SemanticConfig};
use crate::store::{AnnBuild, Store, StoreError};
use crate::vocab::{Entry, MatchType, QueueOp};

/// Errors that can occur during semantic operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    #[error("Semantic search is disabled")]
    Disabled,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Ann(#[from] AnnError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SemanticError {
    /// Whether a weaker matching strategy should take over.
    pub fn is_unavailable(&self) -> bool {
        match self {
            SemanticError::Disabled => true,
            SemanticError::Embedding(e) => e.is_unavailable(),
            SemanticError::Ann(e) => e.is_unavailable(),
            SemanticError::Store(_) | SemanticError::Internal(_) => false,
        }
    }
}

fn poisoned<T>(e: PoisonError<T>) -> SemanticError {
    SemanticError::Internal(format!("Lock poisoned: {}", e))
}

/// SHA-256 of the embedded text, hex encoded.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// An entry found by vector similarity.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    pub entry: Entry,
    pub score: f32,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticStatus {
    pub enabled: bool,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnStatus {
    pub enabled: bool,
    pub backend: &'static str,
    pub model: String,
    pub index_path: String,
    pub exists: bool,
    pub meta: Option<ArtifactMeta>,
    pub last_build: Option<AnnBuild>,
    pub pending: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Queue items consumed
    pub applied: usize,
    /// Members of the rebuilt index
    pub rebuilt: usize,
}

type LoadEmbedder = fn(&str, &Path, u64) -> Result<Arc<dyn Embedder>, EmbeddingError>;

/// Explicit replacement for process-wide model/index singletons: constructed
/// once at startup and handed to every command.
pub struct SemanticService {
    config: SemanticConfig,
    ann: AnnConfig,
    base_path: PathBuf,
    loader: LoadEmbedder,
    /// Load outcome per model, failures included, kept for the process
    embedders: Mutex<HashMap<String, Result<Arc<dyn Embedder>, EmbeddingError>>>,
    indexes: Mutex<HashMap<String, Box<dyn AnnIndex>>>,
    index_builds: AtomicUsize,
}

impl SemanticService {
    /// Create the service. Nothing is loaded until first use.
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.semantic.clone(),
            ann: config.ann.clone(),
            base_path: config.base_path().to_path_buf(),
            loader: load_embedder,
            embedders: Mutex::new(HashMap::new()),
            indexes: Mutex::new(HashMap::new()),
            index_builds: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    fn with_loader(mut self, loader: LoadEmbedder) -> Self {
        self.loader = loader;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn min_score(&self) -> f32 {
        self.config.min_score
    }

    /// `model` when given and non-blank, otherwise the configured model.
    pub fn model_or_default<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        match model.map(str::trim) {
            Some(m) if !m.is_empty() => m,
            _ => &self.config.model,
        }
    }

    /// The cached embedder for `model`, loading it on first use. A model
    /// that failed to load stays unavailable for the rest of the process.
    pub fn embedder(&self, model: &str) -> Result<Arc<dyn Embedder>, SemanticError> {
        if !self.config.enabled {
            return Err(SemanticError::Disabled);
        }

        let mut cache = self.embedders.lock().map_err(poisoned)?;
        let loaded = cache.entry(model.to_string()).or_insert_with(|| {
            (self.loader)(model, &self.base_path, self.config.download_timeout_secs)
                .inspect_err(|e| log::warn!("semantic model unavailable model={model}: {e}"))
        });

        match loaded {
            Ok(embedder) => Ok(Arc::clone(embedder)),
            Err(e) => Err(e.clone().into()),
        }
    }

    pub fn status(&self, store: &Store, model: &str) -> Result<SemanticStatus, SemanticError> {
        match self.embedder(model) {
            Ok(_) => Ok(SemanticStatus {
                enabled: true,
                model: model.to_string(),
                count: Some(store.count_embeddings(model)?),
            }),
            Err(e) if e.is_unavailable() => Ok(SemanticStatus {
                enabled: false,
                model: model.to_string(),
                count: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// Embed the given entries whose stored embedding is missing or stale.
    /// Returns how many were (re)computed.
    pub fn ensure_embeddings(
        &self,
        store: &Store,
        model: &str,
        entries: &[Entry],
    ) -> Result<usize, SemanticError> {
        let embedder = self.embedder(model)?;
        self.embed_entries(store, embedder.as_ref(), model, entries, false)
    }

    /// Re-embed every live entry.
    pub fn rebuild_embeddings(&self, store: &Store, model: &str) -> Result<usize, SemanticError> {
        let embedder = self.embedder(model)?;
        let entries = store.live_entries(None)?;
        let count = self.embed_entries(store, embedder.as_ref(), model, &entries, true)?;
        log::info!("rebuilt embeddings model={model} count={count}");
        Ok(count)
    }

    fn embed_entries(
        &self,
        store: &Store,
        embedder: &dyn Embedder,
        model: &str,
        entries: &[Entry],
        force: bool,
    ) -> Result<usize, SemanticError> {
        let mut pending: Vec<(i64, String, String)> = Vec::new();
        for entry in entries {
            let Some(text) = entry.embedding_text() else {
                continue;
            };
            let hash = content_hash(&text);
            if !force {
                if let Some(existing) = store.get_embedding(entry.id, model)? {
                    if existing.content_hash == hash
                        && existing.vector.len() == embedder.dimensions()
                    {
                        continue;
                    }
                }
            }
            pending.push((entry.id, text, hash));
        }

        if pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = pending.iter().map(|(_, text, _)| text.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != pending.len() {
            return Err(SemanticError::Internal(format!(
                "model returned {} vectors for {} texts",
                vectors.len(),
                pending.len()
            )));
        }

        for ((entry_id, _, hash), vector) in pending.iter().zip(&vectors) {
            store.upsert_embedding(*entry_id, model, vector, hash)?;
        }

        log::debug!("embedded entries model={model} count={}", pending.len());
        Ok(pending.len())
    }

    /// Exhaustive cosine search over stored embeddings. Computes embeddings
    /// for all live entries first when none are stored yet.
    pub fn brute_force_search(
        &self,
        store: &Store,
        model: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SemanticHit>, SemanticError> {
        let embedder = self.embedder(model)?;
        let query_vec = embedder.embed(query)?;

        let mut stored = store.live_embeddings(model)?;
        if stored.is_empty() {
            self.rebuild_embeddings(store, model)?;
            stored = store.live_embeddings(model)?;
        }

        let items = stored.into_iter().map(|e| (e.entry_id, e.vector)).collect();
        let mut index = FlatIndex::from_vectors(embedder.dimensions(), items);
        let results = index.search(&query_vec, k)?;

        hydrate(store, results, MatchType::Semantic)
    }

    /// ANN search; falls back to brute force when the index is unavailable.
    pub fn search(
        &self,
        store: &Store,
        model: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SemanticHit>, SemanticError> {
        match self.ann_search(store, model, query, k) {
            Err(e) if e.is_unavailable() => {
                log::debug!("ann unavailable, using brute force: {e}");
                self.brute_force_search(store, model, query, k)
            }
            other => other,
        }
    }

    /// Search the ANN index for `model`, loading or building it as needed.
    /// An empty index is rebuilt once before giving up.
    pub fn ann_search(
        &self,
        store: &Store,
        model: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SemanticHit>, SemanticError> {
        self.check_backend()?;
        let embedder = self.embedder(model)?;
        let query_vec = embedder.embed(query)?;

        let (mut len, fresh) = self.ensure_index(store, model, embedder.dimensions())?;
        if len == 0 && !fresh {
            log::debug!("ann index empty model={model}, rebuilding");
            len = self.rebuild_index(store, model)?.1;
        }
        if len == 0 {
            return Err(AnnError::Unavailable("no embeddings to index".to_string()).into());
        }

        let results = {
            let mut cache = self.indexes.lock().map_err(poisoned)?;
            let index = cache.get_mut(model).ok_or_else(|| {
                SemanticError::Internal(format!("ann index for {model} missing after build"))
            })?;
            index.search(&query_vec, k)?
        };

        // the index may predate soft deletes that are still queued
        hydrate(store, results, MatchType::SemanticAnn)
    }

    /// Rebuild the index from all live embeddings and record the build.
    pub fn rebuild_ann(&self, store: &Store, model: &str) -> Result<AnnBuild, SemanticError> {
        let (dim, count) = self.rebuild_index(store, model)?;
        Ok(store.finish_ann_rebuild(model, dim, count, &[])?)
    }

    /// Drain up to `ann.max_drain` queue items: refresh the embeddings of the
    /// upserted entries, rebuild the index, then clear the drained items
    /// together with the build record. A failed rebuild leaves the queue
    /// untouched.
    pub fn apply_updates(&self, store: &Store, model: &str) -> Result<ApplyReport, SemanticError> {
        let queue = store.fetch_queue(self.ann.max_drain)?;
        if queue.is_empty() {
            return Ok(ApplyReport {
                applied: 0,
                rebuilt: 0,
            });
        }

        let mut upsert_ids: Vec<i64> = queue
            .iter()
            .filter(|item| item.op == QueueOp::Upsert)
            .map(|item| item.entry_id)
            .collect();
        upsert_ids.sort_unstable();
        upsert_ids.dedup();

        let entries = store.get_entries_by_ids(&upsert_ids)?;
        self.ensure_embeddings(store, model, &entries)?;

        let (dim, count) = self.rebuild_index(store, model)?;
        let drained: Vec<i64> = queue.iter().map(|item| item.id).collect();
        store.finish_ann_rebuild(model, dim, count, &drained)?;

        log::info!(
            "drained ann queue model={model} applied={} rebuilt={count}",
            drained.len()
        );
        Ok(ApplyReport {
            applied: drained.len(),
            rebuilt: count,
        })
    }

    pub fn ann_status(&self, store: &Store, model: &str) -> Result<AnnStatus, SemanticError> {
        let artifact = self.artifact(model);
        let meta = artifact.read_meta().unwrap_or_else(|e| {
            log::warn!("unreadable ann meta model={model}: {e}");
            None
        });

        Ok(AnnStatus {
            enabled: self.config.enabled && ann::backend_available(self.ann.backend),
            backend: self.ann.backend.as_str(),
            model: model.to_string(),
            index_path: artifact.index_path().display().to_string(),
            exists: artifact.exists(),
            meta,
            last_build: store.last_ann_build(model)?,
            pending: store.count_queue()?,
        })
    }

    fn artifact(&self, model: &str) -> AnnArtifact {
        AnnArtifact::for_model(&self.base_path, model)
    }

    fn check_backend(&self) -> Result<(), SemanticError> {
        if !ann::backend_available(self.ann.backend) {
            return Err(AnnError::Unavailable(format!(
                "{} backend not available",
                self.ann.backend.as_str()
            ))
            .into());
        }
        Ok(())
    }

    /// Make sure an index for `model` is cached: memory, then disk, then a
    /// fresh build. Returns its size and whether it was just built.
    fn ensure_index(
        &self,
        store: &Store,
        model: &str,
        dim: usize,
    ) -> Result<(usize, bool), SemanticError> {
        {
            let cache = self.indexes.lock().map_err(poisoned)?;
            if let Some(index) = cache.get(model) {
                if index.dimensions() == dim && index.backend() == self.ann.backend {
                    return Ok((index.len(), false));
                }
            }
        }

        if let Some(index) = self.load_index(model, dim) {
            let len = index.len();
            log::info!("loaded ann index model={model} count={len}");
            self.indexes
                .lock()
                .map_err(poisoned)?
                .insert(model.to_string(), index);
            return Ok((len, false));
        }

        Ok((self.rebuild_index(store, model)?.1, true))
    }

    fn load_index(&self, model: &str, dim: usize) -> Option<Box<dyn AnnIndex>> {
        let artifact = self.artifact(model);
        if !artifact.exists() {
            return None;
        }

        match artifact.load() {
            Ok((file_dim, items)) if file_dim == dim => {
                match ann::build_index(self.ann.backend, dim, items, self.ann.ef_search) {
                    Ok(index) => Some(index),
                    Err(e) => {
                        log::warn!("failed to build ann index from artifact: {e}");
                        None
                    }
                }
            }
            Ok((file_dim, _)) => {
                log::warn!("ann artifact dim={file_dim} does not match model dim={dim}, rebuilding");
                None
            }
            Err(e) => {
                log::warn!("failed to load ann artifact model={model}: {e}");
                None
            }
        }
    }

    /// Build from the live embeddings, persist and cache. An empty live set
    /// still produces an (empty) index so soft deletes take effect.
    fn rebuild_index(&self, store: &Store, model: &str) -> Result<(usize, usize), SemanticError> {
        self.check_backend()?;
        let dim = self.embedder(model)?.dimensions();

        let items = store
            .live_embeddings(model)?
            .into_iter()
            .map(|e| (e.entry_id, e.vector))
            .collect();
        let items = ann::prepare(dim, items);

        let index = ann::build_index(self.ann.backend, dim, items.clone(), self.ann.ef_search)?;
        let count = index.len();

        let meta = ArtifactMeta {
            model: model.to_string(),
            backend: self.ann.backend.as_str().to_string(),
            dim,
            count,
            built_at: Utc::now(),
        };
        self.artifact(model)
            .save(&items, &meta)
            .map_err(AnnError::from)?;

        self.indexes
            .lock()
            .map_err(poisoned)?
            .insert(model.to_string(), index);

        let builds = self.index_builds.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!(
            "rebuilt ann index model={model} backend={} count={count} dim={dim} builds={builds}",
            self.ann.backend.as_str()
        );
        Ok((dim, count))
    }
}

/// Attach live entries to index hits, dropping ids that are gone.
fn hydrate(
    store: &Store,
    results: Vec<SearchResult>,
    match_type: MatchType,
) -> Result<Vec<SemanticHit>, SemanticError> {
    let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
    let entries: HashMap<i64, Entry> = store
        .get_entries_by_ids(&ids)?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();

    Ok(results
        .into_iter()
        .filter_map(|r| {
            let entry = entries.get(&r.id)?.clone();
            Some(SemanticHit {
                entry,
                score: r.score,
                match_type,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnBackendKind;
    use crate::vocab::{Language, NewEntry};

    fn test_config(dir: &std::path::Path, backend: AnnBackendKind) -> Config {
        let mut config = Config::with_base_path(dir);
        config.semantic.model = "ngram".to_string();
        config.ann.backend = backend;
        config
    }

    fn seed(store: &Store) -> Vec<Entry> {
        ["resilient", "umbrella", "calm"]
            .into_iter()
            .map(|w| store.add_entry(&NewEntry::new(Language::En, w)).unwrap())
            .collect()
    }

    #[test]
    fn test_disabled_service_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), AnnBackendKind::Flat);
        config.semantic.enabled = false;
        let service = SemanticService::new(&config);
        let store = Store::open_in_memory().unwrap();

        let result = service.brute_force_search(&store, "ngram", "calm", 3);
        assert!(matches!(result, Err(SemanticError::Disabled)));

        let status = service.status(&store, "ngram").unwrap();
        assert!(!status.enabled);
        assert!(status.count.is_none());
    }

    #[test]
    fn test_model_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticService::new(&test_config(dir.path(), AnnBackendKind::Flat));
        assert_eq!(service.model_or_default(None), "ngram");
        assert_eq!(service.model_or_default(Some("  ")), "ngram");
        assert_eq!(service.model_or_default(Some("other")), "other");
    }

    #[test]
    fn test_ensure_embeddings_skips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticService::new(&test_config(dir.path(), AnnBackendKind::Flat));
        let store = Store::open_in_memory().unwrap();
        let entries = seed(&store);

        assert_eq!(service.ensure_embeddings(&store, "ngram", &entries).unwrap(), 3);
        assert_eq!(service.ensure_embeddings(&store, "ngram", &entries).unwrap(), 0);

        let update = crate::vocab::EntryUpdate {
            notes: Some("stays dry".to_string()),
            ..Default::default()
        };
        store.update_entry(entries[1].id, &update).unwrap();
        let refreshed = store.get_entries_by_ids(&[entries[1].id]).unwrap();
        assert_eq!(service.ensure_embeddings(&store, "ngram", &refreshed).unwrap(), 1);

        assert_eq!(service.status(&store, "ngram").unwrap().count, Some(3));
    }

    #[test]
    fn test_brute_force_embeds_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticService::new(&test_config(dir.path(), AnnBackendKind::Flat));
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        let hits = service.brute_force_search(&store, "ngram", "resilient", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.word, "resilient");
        assert_eq!(hits[0].match_type, MatchType::Semantic);
        assert_eq!(store.count_embeddings("ngram").unwrap(), 3);
    }

    #[test]
    fn test_apply_updates_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticService::new(&test_config(dir.path(), AnnBackendKind::Flat));
        let store = Store::open_in_memory().unwrap();

        let report = service.apply_updates(&store, "ngram").unwrap();
        assert_eq!(report, ApplyReport { applied: 0, rebuilt: 0 });
        assert!(!service.ann_status(&store, "ngram").unwrap().exists);
    }

    #[test]
    fn test_apply_updates_drains_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), AnnBackendKind::Flat);
        let service = SemanticService::new(&config);
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        let report = service.apply_updates(&store, "ngram").unwrap();
        assert_eq!(report, ApplyReport { applied: 3, rebuilt: 3 });
        assert_eq!(store.count_queue().unwrap(), 0);

        let status = service.ann_status(&store, "ngram").unwrap();
        assert!(status.enabled);
        assert!(status.exists);
        assert_eq!(status.pending, 0);
        assert_eq!(status.last_build.unwrap().count, 3);
        assert_eq!(status.meta.unwrap().backend, "flat");

        // a fresh process loads the saved artifact instead of rebuilding
        let reloaded = SemanticService::new(&config);
        let hits = reloaded.ann_search(&store, "ngram", "umbrella", 1).unwrap();
        assert_eq!(hits[0].entry.word, "umbrella");
        assert_eq!(hits[0].match_type, MatchType::SemanticAnn);
    }

    #[test]
    fn test_ann_search_without_embeddings_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticService::new(&test_config(dir.path(), AnnBackendKind::Flat));
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        let err = service.ann_search(&store, "ngram", "calm", 3).unwrap_err();
        assert!(err.is_unavailable());

        // the combined search falls back to brute force
        let hits = service.search(&store, "ngram", "calm", 1).unwrap();
        assert_eq!(hits[0].entry.word, "calm");
        assert_eq!(hits[0].match_type, MatchType::Semantic);
    }

    #[test]
    fn test_disabled_backend() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticService::new(&test_config(dir.path(), AnnBackendKind::Disabled));
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        let err = service.rebuild_ann(&store, "ngram").unwrap_err();
        assert!(err.is_unavailable());
        assert!(!service.ann_status(&store, "ngram").unwrap().enabled);
        // queue is left for a later drain
        assert!(service.apply_updates(&store, "ngram").is_err());
        assert_eq!(store.count_queue().unwrap(), 3);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("calm"), content_hash("calm"));
        assert_ne!(content_hash("calm"), content_hash("calm "));
        assert_eq!(content_hash("calm").len(), 64);
    }

    static FAILED_LOADS: AtomicUsize = AtomicUsize::new(0);

    fn failing_loader(
        model: &str,
        _cache_dir: &Path,
        _timeout_secs: u64,
    ) -> Result<Arc<dyn Embedder>, EmbeddingError> {
        FAILED_LOADS.fetch_add(1, Ordering::SeqCst);
        Err(EmbeddingError::InvalidModel(model.to_string()))
    }

    #[test]
    fn test_failed_model_load_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticService::new(&test_config(dir.path(), AnnBackendKind::Flat))
            .with_loader(failing_loader);
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        for _ in 0..3 {
            let err = service.search(&store, "no-such-model", "calm", 3).unwrap_err();
            assert!(err.is_unavailable());
        }
        assert!(!service.status(&store, "no-such-model").unwrap().enabled);
        assert_eq!(FAILED_LOADS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_index_is_built_once_per_search() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticService::new(&test_config(dir.path(), AnnBackendKind::Flat));
        let store = Store::open_in_memory().unwrap();
        seed(&store);

        assert!(service.ann_search(&store, "ngram", "calm", 3).is_err());
        assert_eq!(service.index_builds.load(Ordering::Relaxed), 1);

        // a cached empty index is retried once
        assert!(service.ann_search(&store, "ngram", "calm", 3).is_err());
        assert_eq!(service.index_builds.load(Ordering::Relaxed), 2);
    }
}

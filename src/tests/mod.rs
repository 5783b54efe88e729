mod ann;
mod notebook;
mod records;
mod semantic;

use std::path::Path;

use serde_json::Value;

use crate::config::{AnnBackendKind, Config};
use crate::dispatch::Dispatcher;

/// Dispatcher over a throw-away data directory. Semantic features use the
/// deterministic `ngram` model with the flat backend.
pub fn test_dispatcher(semantic: bool) -> (tempfile::TempDir, Dispatcher) {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = open_dispatcher(dir.path(), semantic);
    (dir, dispatcher)
}

/// A fresh dispatcher (empty model and index caches) over `dir`.
pub fn open_dispatcher(dir: &Path, semantic: bool) -> Dispatcher {
    let mut config = Config::load_with(dir).unwrap();
    config.semantic.enabled = semantic;
    config.semantic.model = "ngram".to_string();
    config.ann.backend = AnnBackendKind::Flat;
    Dispatcher::open(config).unwrap()
}

pub fn add_entry(d: &Dispatcher, language: &str, word: &str, translation: &str) -> i64 {
    d.handle(
        "add_entry",
        serde_json::json!({"language": language, "word": word, "translation": translation}),
    )
    .unwrap()["id"]
        .as_i64()
        .unwrap()
}

pub fn ids(values: &Value, key: &str) -> Vec<i64> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v[key].as_i64().unwrap())
        .collect()
}

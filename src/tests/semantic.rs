//! Semantic search with the real multilingual model.
//!
//! These tests require model download and are marked #[ignore] by default.
//! Run with: cargo test semantic -- --ignored

use serde_json::json;

use crate::config::{AnnBackendKind, Config};
use crate::dispatch::Dispatcher;
use crate::semantic::DEFAULT_MODEL;

fn model_dispatcher(backend: AnnBackendKind) -> (tempfile::TempDir, Dispatcher) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::load_with(dir.path()).unwrap();
    config.ann.backend = backend;
    (dir, Dispatcher::open(config).unwrap())
}

#[test]
#[ignore = "requires model download"]
fn test_cross_language_neighbours() {
    let (_dir, d) = model_dispatcher(AnnBackendKind::Hnsw);
    for (language, word) in [("en", "umbrella"), ("en", "mountain"), ("zh", "雨伞"), ("zh", "高山")] {
        d.handle("add_entry", json!({"language": language, "word": word}))
            .unwrap();
    }

    let status = d.handle("semantic_status", json!({})).unwrap();
    assert_eq!(status["enabled"], true);
    assert_eq!(status["model"], DEFAULT_MODEL);

    let report = d.handle("ann_apply_updates", json!({})).unwrap();
    assert_eq!(report["rebuilt"], 4);

    let hits = d
        .handle(
            "search_entries",
            json!({"q": "parasol", "mode": "semantic", "limit": 2}),
        )
        .unwrap();
    let words: Vec<&str> = hits
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["word"].as_str().unwrap())
        .collect();
    assert!(words.contains(&"umbrella") || words.contains(&"雨伞"), "{words:?}");
}

#[test]
#[ignore = "requires model download"]
fn test_hnsw_top_hit() {
    let (_dir, d) = model_dispatcher(AnnBackendKind::Hnsw);
    for word in ["calm", "storm", "bread"] {
        d.handle("add_entry", json!({"language": "en", "word": word}))
            .unwrap();
    }
    d.handle("rebuild_embeddings", json!({})).unwrap();
    d.handle("rebuild_ann_index", json!({})).unwrap();

    let ann = d
        .handle("search_entries", json!({"q": "tranquil", "mode": "semantic", "limit": 1}))
        .unwrap();
    assert_eq!(ann[0]["match_type"], "semantic_ann");
    assert_eq!(ann[0]["word"], "calm");
}

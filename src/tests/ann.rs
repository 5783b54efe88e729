//! ANN maintenance through the dispatcher, using the deterministic `ngram`
//! model and the flat backend.

use serde_json::json;

use super::{add_entry, ids, test_dispatcher};
use crate::semantic::ann::AnnArtifact;

fn index_members(d: &crate::dispatch::Dispatcher) -> Vec<i64> {
    let (_, items) = AnnArtifact::for_model(d.config().base_path(), "ngram")
        .load()
        .unwrap();
    items.into_iter().map(|(id, _)| id).collect()
}

#[test]
fn test_delete_then_drain_excludes_entry() {
    let (_dir, d) = test_dispatcher(true);
    let umbrella = add_entry(&d, "en", "umbrella", "雨伞");
    let calm = add_entry(&d, "en", "calm", "平静");

    let report = d.handle("ann_apply_updates", json!({})).unwrap();
    assert_eq!(report, json!({"applied": 2, "rebuilt": 2}));
    assert_eq!(index_members(&d), vec![umbrella, calm]);

    d.handle("delete_entry", json!({ "id": umbrella })).unwrap();
    let status = d.handle("ann_status", json!({})).unwrap();
    assert_eq!(status["pending"], 1);

    let report = d.handle("ann_apply_updates", json!({})).unwrap();
    assert_eq!(report["applied"], 1);
    assert_eq!(index_members(&d), vec![calm]);

    let hits = d
        .handle("search_entries", json!({"q": "umbrella", "mode": "semantic"}))
        .unwrap();
    assert!(!ids(&hits, "id").contains(&umbrella));
}

#[test]
fn test_upsert_then_drain_includes_entry() {
    let (_dir, d) = test_dispatcher(true);
    let calm = add_entry(&d, "en", "calm", "");
    d.handle("ann_apply_updates", json!({})).unwrap();

    let sturdy = add_entry(&d, "en", "sturdy", "");
    assert_eq!(index_members(&d), vec![calm]);

    d.handle("ann_apply_updates", json!({})).unwrap();
    assert_eq!(index_members(&d), vec![calm, sturdy]);

    let hits = d
        .handle("search_entries", json!({"q": "sturdy", "mode": "semantic", "limit": 1}))
        .unwrap();
    assert_eq!(ids(&hits, "id"), vec![sturdy]);
    assert_eq!(hits[0]["match_type"], "semantic_ann");
}

#[test]
fn test_rebuild_is_idempotent() {
    let (_dir, d) = test_dispatcher(true);
    for word in ["calm", "sturdy", "umbrella"] {
        add_entry(&d, "en", word, "");
    }

    let first = d.handle("rebuild_ann_index", json!({})).unwrap();
    let members = index_members(&d);
    let second = d.handle("rebuild_ann_index", json!({})).unwrap();
    assert_eq!(first, second);
    assert_eq!(index_members(&d), members);
    // embeddings were never computed, so nothing to index yet
    assert_eq!(first, json!({"rebuilt": 0}));

    d.handle("rebuild_embeddings", json!({})).unwrap();
    let built = d.handle("rebuild_ann_index", json!({})).unwrap();
    assert_eq!(built, json!({"rebuilt": 3}));
    let again = d.handle("rebuild_ann_index", json!({})).unwrap();
    assert_eq!(again, built);
    assert_eq!(index_members(&d).len(), 3);
}

#[test]
fn test_failed_rebuild_keeps_queue() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = crate::config::Config::load_with(dir.path()).unwrap();
    config.semantic.model = "ngram".to_string();
    config.ann.backend = crate::config::AnnBackendKind::Disabled;
    let d = crate::dispatch::Dispatcher::open(config).unwrap();
    add_entry(&d, "en", "calm", "");

    let err = d.handle("ann_apply_updates", json!({})).unwrap_err();
    assert_eq!(err.code(), "semantic_unavailable");
    assert_eq!(d.store().count_queue().unwrap(), 1);

    // brute force still answers when the index cannot be built
    let hits = d
        .handle("search_entries", json!({"q": "calm", "mode": "semantic"}))
        .unwrap();
    assert_eq!(hits[0]["match_type"], "semantic");
}

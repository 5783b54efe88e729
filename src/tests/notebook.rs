use serde_json::json;

use super::{add_entry, ids, test_dispatcher};

#[test]
fn test_cross_language_resolution() {
    let (_dir, d) = test_dispatcher(false);
    let en = add_entry(&d, "en", "resilient", "坚韧");
    let zh = add_entry(&d, "zh", "坚韧", "");

    let res = d
        .handle("resolve_entry", json!({"q": "坚韧", "language": "zh"}))
        .unwrap();
    assert_eq!(res["best"]["entry_id"], zh);
    assert_eq!(res["best"]["match_type"], "exact_word");

    let en_candidate = res["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["entry_id"] == en)
        .unwrap();
    assert_eq!(en_candidate["match_type"], "exact_translation");
    assert!(en_candidate["score"].as_f64().unwrap() < res["best"]["score"].as_f64().unwrap());
}

#[test]
fn test_auto_link_on_creation() {
    let (_dir, d) = test_dispatcher(false);
    let zh = add_entry(&d, "zh", "坚韧", "");
    let added = d
        .handle(
            "add_entry",
            json!({"language": "en", "word": "resilient", "translation": "坚韧"}),
        )
        .unwrap();
    assert!(!added["linked_relations"].as_array().unwrap().is_empty());

    let rels = d.handle("list_relations", json!({ "id": zh })).unwrap();
    let rels = rels.as_array().unwrap();
    assert!(rels
        .iter()
        .any(|r| r["type"] == "translation" && r["from_id"] == added["id"]));
    assert!(rels.iter().all(|r| r["from_id"] != r["to_id"]));
}

#[test]
fn test_synonyms_chain_respects_depth() {
    let (_dir, d) = test_dispatcher(false);
    let a = add_entry(&d, "en", "apple", "");
    let b = add_entry(&d, "en", "brook", "");
    let c = add_entry(&d, "en", "cider", "");
    let dd = add_entry(&d, "en", "dune", "");
    for (from, to) in [(a, b), (b, c), (c, dd)] {
        d.handle(
            "upsert_relation",
            json!({"from_id": from, "to_id": to, "type": "synonym"}),
        )
        .unwrap();
    }

    let found = d
        .handle(
            "get_synonyms",
            json!({"q": "apple", "language": "en", "depth": 2, "fallback": false}),
        )
        .unwrap();
    assert_eq!(found["entry"]["entry_id"], a);
    assert_eq!(ids(&found["graph_results"], "entry_id"), vec![b, c]);
    assert_eq!(found["graph_results"][1]["distance"], 2);
    assert!(found["fallback_results"].as_array().unwrap().is_empty());

    let deeper = d
        .handle(
            "get_synonyms",
            json!({"q": "apple", "depth": 3, "fallback": false}),
        )
        .unwrap();
    assert_eq!(ids(&deeper["graph_results"], "entry_id"), vec![b, c, dd]);

    let other_type = d
        .handle(
            "get_synonyms",
            json!({"q": "apple", "includeTypes": ["antonym"], "fallback": false}),
        )
        .unwrap();
    assert!(other_type["graph_results"].as_array().unwrap().is_empty());
}

#[test]
fn test_relation_validation() {
    let (_dir, d) = test_dispatcher(false);
    let a = add_entry(&d, "en", "apple", "");

    let err = d
        .handle("upsert_relation", json!({"from_id": a, "to_id": 99, "type": "synonym"}))
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
    let err = d
        .handle("upsert_relation", json!({"from_id": a, "to_id": a, "type": "synonym"}))
        .unwrap_err();
    assert_eq!(err.code(), "bad_request");
    let err = d
        .handle("upsert_relation", json!({"from_id": a, "to_id": 2}))
        .unwrap_err();
    assert_eq!(err.code(), "missing_fields");
}

#[test]
fn test_search_modes() {
    let (_dir, d) = test_dispatcher(false);
    let tough = add_entry(&d, "en", "tough", "坚强");
    let hardy = add_entry(&d, "en", "hardy", "");
    d.handle(
        "upsert_relation",
        json!({"from_id": tough, "to_id": hardy, "type": "synonym"}),
    )
    .unwrap();

    let like = d.handle("search_entries", json!({"q": "坚强"})).unwrap();
    assert_eq!(ids(&like, "id"), vec![tough]);

    let fts = d
        .handle("search_entries", json!({"q": "tough", "mode": "fts"}))
        .unwrap();
    assert_eq!(ids(&fts, "id"), vec![tough]);
    assert_eq!(fts[0]["match_type"], "fts");

    let expanded = d
        .handle(
            "search_entries",
            json!({"q": "tough", "mode": "fts", "expand_relations": true}),
        )
        .unwrap();
    assert_eq!(ids(&expanded, "id"), vec![tough, hardy]);

    let fuzzy = d
        .handle("search_entries", json!({"q": "toughh", "mode": "fuzzy"}))
        .unwrap();
    assert_eq!(ids(&fuzzy, "id"), vec![tough]);
}

#[test]
fn test_deleted_entries_drop_out() {
    let (_dir, d) = test_dispatcher(false);
    let calm = add_entry(&d, "en", "calm", "");
    d.handle("delete_entry", json!({ "id": calm })).unwrap();

    let res = d.handle("resolve_entry", json!({"q": "calm"})).unwrap();
    assert!(res["best"].is_null());
    let found = d.handle("search_entries", json!({"q": "calm"})).unwrap();
    assert_eq!(found, json!([]));

    // still readable by id
    let entry = d.handle("get_entry", json!({ "id": calm })).unwrap();
    assert!(!entry["deleted_at"].is_null());
}

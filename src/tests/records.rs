use serde_json::json;

use super::{add_entry, open_dispatcher, test_dispatcher};

#[test]
fn test_record_annotation_and_manual_links() {
    let (_dir, d) = test_dispatcher(false);
    let en = add_entry(&d, "en", "resilient", "");
    let zh = add_entry(&d, "zh", "坚韧", "");

    let added = d
        .handle("add_record", json!({"text": "resilient的坚韧度 quux"}))
        .unwrap();
    let record_id = added["record_id"].as_i64().unwrap();
    let anns = added["annotations"].as_array().unwrap();
    let spans: Vec<(i64, i64)> = anns
        .iter()
        .map(|a| (a["start"].as_i64().unwrap(), a["end"].as_i64().unwrap()))
        .collect();
    assert_eq!(spans, vec![(0, 9), (10, 13), (14, 18)]);
    assert_eq!(anns[0]["entry_id"], en);
    assert_eq!(anns[1]["entry_id"], zh);
    assert_eq!(anns[1]["match_type"], "fuzzy_word");
    assert!(anns[2]["entry_id"].is_null());
    assert!(!anns[1]["candidates"].as_array().unwrap().is_empty());

    // a manual link replaces the automatic one at the same span
    let linked = d
        .handle(
            "link_record",
            json!({"record_id": record_id, "entry_id": en, "start": 10, "end": 13}),
        )
        .unwrap();
    assert_eq!(linked["annotations"][1]["entry_id"], en);
    assert_eq!(linked["annotations"][1]["match_type"], "manual");
    assert_eq!(linked["annotations"][1]["score"], 1.0);

    let record = d.handle("get_record", json!({ "record_id": record_id })).unwrap();
    assert_eq!(record["text"], "resilient的坚韧度 quux");
    assert_eq!(record["annotations"][1]["entry_id"], en);
    assert_eq!(record["annotations"][1]["candidates"], json!([]));

    let unlinked = d
        .handle(
            "unlink_record",
            json!({"record_id": record_id, "entry_id": en, "start": 10, "end": 13}),
        )
        .unwrap();
    assert!(unlinked["annotations"][1]["entry_id"].is_null());
    assert_eq!(unlinked["annotations"][0]["entry_id"], en);

    let err = d
        .handle(
            "link_record",
            json!({"record_id": record_id, "entry_id": en, "start": 13, "end": 10}),
        )
        .unwrap_err();
    assert_eq!(err.code(), "bad_range");
}

#[test]
fn test_update_record_relinks() {
    let (_dir, d) = test_dispatcher(false);
    let calm = add_entry(&d, "en", "calm", "");
    let added = d.handle("add_record", json!({"text": "stay calm"})).unwrap();
    let record_id = added["record_id"].as_i64().unwrap();
    assert_eq!(added["annotations"][1]["entry_id"], calm);

    let updated = d
        .handle(
            "update_record",
            json!({"record_id": record_id, "text": "be calm now"}),
        )
        .unwrap();
    assert_eq!(updated["annotations"][1]["start"], 3);
    assert_eq!(updated["annotations"][1]["entry_id"], calm);

    let record = d.handle("get_record", json!({ "record_id": record_id })).unwrap();
    assert_eq!(record["text"], "be calm now");
    assert!(record["annotations"][0]["entry_id"].is_null());

    let records = d.handle("list_records", json!({})).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1);

    let err = d
        .handle("update_record", json!({"record_id": 99, "text": "x"}))
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[test]
fn test_record_links_enqueue_entries() {
    let (_dir, d) = test_dispatcher(false);
    add_entry(&d, "en", "calm", "");
    let before = d.store().count_queue().unwrap();

    d.handle("add_record", json!({"text": "calm calm"})).unwrap();
    // one upsert per distinct entry
    assert_eq!(d.store().count_queue().unwrap(), before + 1);
}

#[test]
fn test_failed_annotation_stores_nothing() {
    let (dir, d) = test_dispatcher(true);
    let record_id = d.handle("add_record", json!({"text": "calm"})).unwrap()["record_id"]
        .as_i64()
        .unwrap();

    // a plain file where the index directory belongs makes the semantic stage fail
    std::fs::remove_dir_all(dir.path().join("ann")).ok();
    std::fs::write(dir.path().join("ann"), b"").unwrap();
    drop(d);
    let d = open_dispatcher(dir.path(), true);

    let err = d.handle("add_record", json!({"text": "zzqx"})).unwrap_err();
    assert_eq!(err.code(), "exception");
    let records = d.handle("list_records", json!({})).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1);

    let err = d
        .handle("update_record", json!({"record_id": record_id, "text": "zzqx"}))
        .unwrap_err();
    assert_eq!(err.code(), "exception");
    let record = d.handle("get_record", json!({ "record_id": record_id })).unwrap();
    assert_eq!(record["text"], "calm");
}

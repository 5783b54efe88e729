//! Relation discovery for newly created entries.

use super::similarity::ratio;
use crate::config::LinkingConfig;
use crate::store::{Result, Store};
use crate::vocab::{Entry, REL_SYNONYM, REL_TRANSLATION};

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Entries whose word or translation resembles `entry`'s translation.
pub fn translation_targets(entry: &Entry, others: &[Entry], threshold: f32) -> Vec<i64> {
    let Some(translation) = non_empty(entry.translation.as_deref()) else {
        return vec![];
    };

    others
        .iter()
        .filter(|other| other.id != entry.id)
        .filter(|other| {
            let word = ratio(translation, &other.word);
            let trans = non_empty(other.translation.as_deref())
                .map(|t| ratio(translation, t))
                .unwrap_or(0.0);
            word.max(trans) >= threshold
        })
        .map(|other| other.id)
        .collect()
}

/// Entries that look like synonyms of `entry`: same-language word
/// similarity, translation similarity, or translation/word overlap across
/// fields.
pub fn synonym_targets(entry: &Entry, others: &[Entry], threshold: f32) -> Vec<i64> {
    let word = non_empty(Some(entry.word.as_str()));
    let translation = non_empty(entry.translation.as_deref());
    if word.is_none() && translation.is_none() {
        return vec![];
    }

    others
        .iter()
        .filter(|other| other.id != entry.id)
        .filter(|other| {
            let other_word = non_empty(Some(other.word.as_str()));
            let other_trans = non_empty(other.translation.as_deref());

            let pairs = [
                (word.filter(|_| other.language == entry.language), other_word),
                (translation, other_trans),
                (translation, other_word),
                (word, other_trans),
            ];
            pairs
                .iter()
                .filter_map(|pair| match pair {
                    (Some(a), Some(b)) => Some(ratio(a, b)),
                    _ => None,
                })
                .any(|score| score >= threshold)
        })
        .map(|other| other.id)
        .collect()
}

/// Link a freshly created entry to the live entries it resembles. Returns
/// the ids of the relations written.
pub fn auto_link(store: &Store, entry: &Entry, config: &LinkingConfig) -> Result<Vec<i64>> {
    if !config.auto_link {
        return Ok(vec![]);
    }

    let others = store.live_entries(None)?;
    let mut relation_ids = Vec::new();

    for target in translation_targets(entry, &others, config.translation_threshold) {
        relation_ids.push(store.upsert_relation(entry.id, target, REL_TRANSLATION)?);
    }
    for target in synonym_targets(entry, &others, config.synonym_threshold) {
        relation_ids.push(store.upsert_relation(entry.id, target, REL_SYNONYM)?);
    }

    if !relation_ids.is_empty() {
        log::debug!(
            "auto-linked entry id={} relations={}",
            entry.id,
            relation_ids.len()
        );
    }
    Ok(relation_ids)
}

use super::similarity::ratio;
use crate::store::{Result, Store};
use crate::vocab::{Candidate, Entry, MatchType};

/// Live entries containing `query` in any text field (case-sensitive), most
/// recently updated first.
pub fn search_like(store: &Store, query: &str, limit: usize, offset: usize) -> Result<Vec<Entry>> {
    store.substring_entries(query, limit, offset)
}

/// Substring hits re-scored by similarity against `word translation`, so
/// they rank alongside fuzzy candidates. Order is kept from the store.
pub fn substring_candidates(store: &Store, query: &str, pool: usize) -> Result<Vec<Candidate>> {
    Ok(search_like(store, query, pool, 0)?
        .iter()
        .map(|entry| {
            let text = format!("{} {}", entry.word, entry.translation_str());
            Candidate::from_entry(entry, ratio(query, &text), MatchType::Substring)
        })
        .collect())
}

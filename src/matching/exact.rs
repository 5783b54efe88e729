use crate::store::{Result, Store};
use crate::vocab::{Candidate, Entry, Language, MatchType};

pub const EXACT_WORD_SCORE: f32 = 1.0;
/// Translation hits are indirect, so they rank just below word hits.
pub const EXACT_TRANSLATION_SCORE: f32 = 0.95;

/// Case-insensitive equality against `word`, then `translation`. At most one
/// candidate per entry, in scan order.
pub fn exact_matches(entries: &[Entry], query: &str) -> Vec<Candidate> {
    let query = query.trim();
    if query.is_empty() {
        return vec![];
    }
    let query = query.to_lowercase();

    entries
        .iter()
        .filter_map(|entry| {
            if entry.word.to_lowercase() == query {
                Some(Candidate::from_entry(
                    entry,
                    EXACT_WORD_SCORE,
                    MatchType::ExactWord,
                ))
            } else if entry
                .translation
                .as_deref()
                .is_some_and(|t| !t.is_empty() && t.to_lowercase() == query)
            {
                Some(Candidate::from_entry(
                    entry,
                    EXACT_TRANSLATION_SCORE,
                    MatchType::ExactTranslation,
                ))
            } else {
                None
            }
        })
        .collect()
}

pub fn resolve_exact(
    store: &Store,
    query: &str,
    language: Option<Language>,
) -> Result<Vec<Candidate>> {
    Ok(exact_matches(&store.live_entries(language)?, query))
}

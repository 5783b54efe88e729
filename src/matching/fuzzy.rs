use super::similarity::ratio;
use crate::store::{Result, Store};
use crate::vocab::{Candidate, Entry, Language, MatchType};

/// Best of `ratio(query, word)` and `ratio(query, translation)` per entry.
/// The translation wins only when strictly better. Candidates below
/// `threshold` are dropped; the rest are sorted by score (stable) and
/// truncated to `top_k`.
pub fn fuzzy_matches(entries: &[Entry], query: &str, threshold: f32, top_k: usize) -> Vec<Candidate> {
    if query.is_empty() {
        return vec![];
    }

    let mut scored: Vec<Candidate> = entries
        .iter()
        .filter_map(|entry| {
            let mut best = (ratio(query, &entry.word), MatchType::FuzzyWord);
            if let Some(translation) = entry.translation.as_deref().filter(|t| !t.is_empty()) {
                let score = ratio(query, translation);
                if score > best.0 {
                    best = (score, MatchType::FuzzyTranslation);
                }
            }
            (best.0 >= threshold).then(|| Candidate::from_entry(entry, best.0, best.1))
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

pub fn resolve_fuzzy(
    store: &Store,
    query: &str,
    language: Option<Language>,
    threshold: f32,
    top_k: usize,
) -> Result<Vec<Candidate>> {
    Ok(fuzzy_matches(
        &store.live_entries(language)?,
        query,
        threshold,
        top_k,
    ))
}

/// Search-mode fuzzy: similarity against `word translation notes` as one
/// string, best first, then paginated.
pub fn search_fuzzy(
    store: &Store,
    query: &str,
    threshold: f32,
    limit: usize,
    offset: usize,
) -> Result<Vec<(Entry, f32)>> {
    let mut scored: Vec<(Entry, f32)> = store
        .live_entries(None)?
        .into_iter()
        .filter_map(|entry| {
            let blob = format!(
                "{} {} {}",
                entry.word,
                entry.translation_str(),
                entry.notes_str()
            );
            let score = ratio(query, &blob);
            (score >= threshold).then_some((entry, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scored.into_iter().skip(offset).take(limit).collect())
}

use serde::Serialize;

use crate::store::{Result, Store};
use crate::vocab::Entry;

#[derive(Debug, Clone, Serialize)]
pub struct FullTextHit {
    pub entry: Entry,
    pub score: f32,
    pub snippet: Option<String>,
}

/// Full-text search with `score = 1 / (1 + rank)`, where `rank` is the
/// bm25 value shifted so the best hit of the whole query sits at 0. Scores
/// stay comparable across pages.
pub fn search_fts(store: &Store, query: &str, limit: usize, offset: usize) -> Result<Vec<FullTextHit>> {
    let hits = store.fts_entries(query, limit, offset)?;
    let Some(page_best) = hits.iter().map(|h| h.rank).reduce(f64::min) else {
        return Ok(vec![]);
    };
    let best_rank = if offset == 0 {
        page_best
    } else {
        store
            .fts_entries(query, 1, 0)?
            .first()
            .map_or(page_best, |h| h.rank)
    };

    Ok(hits
        .into_iter()
        .map(|hit| FullTextHit {
            score: (1.0 / (1.0 + (hit.rank - best_rank))) as f32,
            entry: hit.entry,
            snippet: hit.snippet,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{Language, NewEntry};

    #[test]
    fn test_scores_descend_from_one() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_entry(&NewEntry::new(Language::En, "resilient").with_notes("resilient resilient"))
            .unwrap();
        store
            .add_entry(&NewEntry::new(Language::En, "tough").with_notes("a resilient person, or a very long note"))
            .unwrap();

        let hits = search_fts(&store, "resilient", 10, 0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.word, "resilient");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[1].score < hits[0].score);
        assert!(hits[0].snippet.as_deref().unwrap().contains("[resilient]"));
    }

    #[test]
    fn test_no_hits() {
        let store = Store::open_in_memory().unwrap();
        assert!(search_fts(&store, "nothing", 10, 0).unwrap().is_empty());
        assert!(search_fts(&store, "  ", 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_later_pages_keep_scores() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_entry(&NewEntry::new(Language::En, "resilient").with_notes("resilient resilient"))
            .unwrap();
        store
            .add_entry(&NewEntry::new(Language::En, "tough").with_notes("a resilient person, or a very long note"))
            .unwrap();

        let all = search_fts(&store, "resilient", 10, 0).unwrap();
        let second = search_fts(&store, "resilient", 1, 1).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].entry.id, all[1].entry.id);
        assert!((second[0].score - all[1].score).abs() < 1e-6);
        assert!(second[0].score < 1.0);
    }
}

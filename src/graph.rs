//! Breadth-first search over the relation graph.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::error::{Result, VocabError};
use crate::matching::substring::search_like;
use crate::matching::{ResolveContext, Resolver};
use crate::store::Store;
use crate::vocab::{Candidate, Language, MatchType, REL_SYNONYM, REL_TRANSLATION};

/// Relation types followed when the caller names none.
pub const DEFAULT_TYPES: [&str; 2] = [REL_SYNONYM, REL_TRANSLATION];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphHit {
    pub entry_id: i64,
    pub language: Language,
    pub word: String,
    pub translation: Option<String>,
    /// Edges from the start entry
    pub distance: usize,
    /// Type of the edge this entry was first reached by
    pub via: String,
}

/// Entries reachable from `start_id` within `depth` edges of the given
/// types, walking edges in either direction. Each entry appears once, at its
/// shortest distance. Soft-deleted or missing entries are neither reported
/// nor expanded. Sorted by distance, then word.
pub fn bfs(store: &Store, start_id: i64, depth: usize, include_types: &[String]) -> Result<Vec<GraphHit>> {
    if store.get_live_entry(start_id)?.is_none() {
        return Err(VocabError::entry_not_found(start_id));
    }

    let types: HashSet<&str> = if include_types.is_empty() {
        DEFAULT_TYPES.into_iter().collect()
    } else {
        include_types.iter().map(String::as_str).collect()
    };

    let mut visited = HashSet::from([start_id]);
    let mut queue = VecDeque::from([(start_id, 0usize)]);
    let mut hits = Vec::new();

    while let Some((current, distance)) = queue.pop_front() {
        if distance >= depth {
            continue;
        }

        for relation in store.list_relations(current)? {
            if !types.contains(relation.rel_type.as_str()) {
                continue;
            }
            let neighbor = relation.other_end(current);
            if !visited.insert(neighbor) {
                continue;
            }

            let Some(entry) = store.get_live_entry(neighbor)? else {
                log::debug!("skipping dangling relation id={} to entry={neighbor}", relation.id);
                continue;
            };

            queue.push_back((neighbor, distance + 1));
            hits.push(GraphHit {
                entry_id: neighbor,
                language: entry.language,
                word: entry.word,
                translation: entry.translation,
                distance: distance + 1,
                via: relation.rel_type,
            });
        }
    }

    hits.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.word.cmp(&b.word)));
    Ok(hits)
}

/// Parameters of a synonym lookup.
#[derive(Debug, Clone)]
pub struct SynonymQuery {
    pub query: String,
    pub language: Option<Language>,
    pub depth: usize,
    pub top_k: usize,
    /// Fill up with non-graph matches when the graph is short
    pub fallback: bool,
    pub include_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryRef {
    pub entry_id: i64,
    pub word: String,
    pub language: Language,
}

/// A non-graph result. Substring hits carry no score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackHit {
    pub entry_id: i64,
    pub word: String,
    pub language: Language,
    pub score: Option<f32>,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Serialize)]
pub struct Synonyms {
    pub entry: Option<EntryRef>,
    pub graph_results: Vec<GraphHit>,
    pub fallback_results: Vec<FallbackHit>,
    pub candidates: Vec<Candidate>,
}

/// Resolve `query`, then walk the graph from the best candidate. When the
/// graph yields fewer than `top_k` entries and fallback is on, unvisited
/// resolver candidates and then substring hits make up the difference.
pub fn synonyms(ctx: &ResolveContext<'_>, resolver: &Resolver, q: &SynonymQuery) -> Result<Synonyms> {
    if q.query.trim().is_empty() {
        return Err(VocabError::missing(&["q"]));
    }

    let resolution = resolver.resolve(ctx, &q.query, q.language, q.top_k.max(5))?;
    let Some(best) = resolution.best else {
        return Ok(Synonyms {
            entry: None,
            graph_results: vec![],
            fallback_results: vec![],
            candidates: resolution.candidates,
        });
    };

    let mut graph_results = bfs(ctx.store, best.entry_id, q.depth, &q.include_types)?;
    let mut visited: HashSet<i64> = graph_results.iter().map(|g| g.entry_id).collect();
    visited.insert(best.entry_id);

    let mut fallback_results = Vec::new();
    if q.fallback && graph_results.len() < q.top_k {
        let room = q.top_k - graph_results.len();

        for c in &resolution.candidates {
            if fallback_results.len() >= room {
                break;
            }
            if visited.insert(c.entry_id) {
                fallback_results.push(FallbackHit {
                    entry_id: c.entry_id,
                    word: c.word.clone(),
                    language: c.language,
                    score: Some(c.score),
                    match_type: c.match_type,
                });
            }
        }

        if fallback_results.len() < room {
            for entry in search_like(ctx.store, &q.query, q.top_k.saturating_mul(2), 0)? {
                if fallback_results.len() >= room {
                    break;
                }
                if visited.insert(entry.id) {
                    fallback_results.push(FallbackHit {
                        entry_id: entry.id,
                        word: entry.word,
                        language: entry.language,
                        score: None,
                        match_type: MatchType::Substring,
                    });
                }
            }
        }
    }

    graph_results.truncate(q.top_k);
    log::debug!(
        "synonyms query={:?} start={} graph={} fallback={}",
        q.query,
        best.entry_id,
        graph_results.len(),
        fallback_results.len()
    );

    Ok(Synonyms {
        entry: Some(EntryRef {
            entry_id: best.entry_id,
            word: best.word,
            language: best.language,
        }),
        graph_results,
        fallback_results,
        candidates: resolution.candidates,
    })
}

//! Entry search: substring, fuzzy, full-text and semantic modes, with
//! optional one-hop relation expansion.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;
use std::str::FromStr;

use serde::Serialize;

use crate::config::SearchConfig;
use crate::error::{Result, VocabError};
use crate::matching::fulltext::search_fts;
use crate::matching::fuzzy::search_fuzzy;
use crate::matching::substring::search_like;
use crate::semantic::SemanticService;
use crate::store::Store;
use crate::vocab::{Entry, MatchType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Like,
    Fuzzy,
    Fts,
    Semantic,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Like => "like",
            SearchMode::Fuzzy => "fuzzy",
            SearchMode::Fts => "fts",
            SearchMode::Semantic => "semantic",
        }
    }
}

impl Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "like" => Ok(SearchMode::Like),
            "fuzzy" => Ok(SearchMode::Fuzzy),
            "fts" => Ok(SearchMode::Fts),
            "semantic" => Ok(SearchMode::Semantic),
            other => Err(VocabError::BadRequest(format!("unknown search mode {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub limit: usize,
    pub offset: usize,
    pub fallback_fuzzy: bool,
    pub expand_relations: bool,
    pub model: Option<String>,
}

impl SearchOptions {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            mode: SearchMode::Like,
            limit: config.default_limit,
            offset: 0,
            fallback_fuzzy: true,
            expand_relations: false,
            model: None,
        }
    }
}

/// A search result. Entries appended by relation expansion carry no score
/// and no match type.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub entry: Entry,
    pub score: Option<f32>,
    pub match_type: Option<MatchType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl SearchHit {
    fn scored(entry: Entry, score: Option<f32>, match_type: MatchType) -> Self {
        Self {
            entry,
            score,
            match_type: Some(match_type),
            snippet: None,
        }
    }
}

pub struct Searcher<'a> {
    pub store: &'a Store,
    pub semantic: &'a SemanticService,
    pub config: &'a SearchConfig,
}

impl Searcher<'_> {
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let mut hits = match opts.mode {
            SearchMode::Like => {
                let hits: Vec<SearchHit> = search_like(self.store, query, opts.limit, opts.offset)?
                    .into_iter()
                    .map(|entry| SearchHit::scored(entry, None, MatchType::Substring))
                    .collect();
                self.or_fuzzy(hits, query, opts)?
            }
            SearchMode::Fuzzy => self.fuzzy(query, opts)?,
            SearchMode::Fts => {
                let hits: Vec<SearchHit> = search_fts(self.store, query, opts.limit, opts.offset)?
                    .into_iter()
                    .map(|hit| SearchHit {
                        snippet: hit.snippet,
                        ..SearchHit::scored(hit.entry, Some(hit.score), MatchType::Fts)
                    })
                    .collect();
                self.or_fuzzy(hits, query, opts)?
            }
            SearchMode::Semantic => {
                let model = self.semantic.model_or_default(opts.model.as_deref());
                self.semantic
                    .search(self.store, model, query, opts.limit)?
                    .into_iter()
                    .map(|hit| SearchHit::scored(hit.entry, Some(hit.score), hit.match_type))
                    .collect()
            }
        };

        log::debug!(
            "search mode={} query={query:?} hits={}",
            opts.mode,
            hits.len()
        );

        if opts.expand_relations && !hits.is_empty() {
            let neighbors = self.neighbors(&hits)?;
            hits.extend(neighbors.into_iter().map(|entry| SearchHit {
                entry,
                score: None,
                match_type: None,
                snippet: None,
            }));
        }

        Ok(hits)
    }

    fn fuzzy(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        Ok(search_fuzzy(
            self.store,
            query,
            self.config.fuzzy_threshold,
            opts.limit,
            opts.offset,
        )?
        .into_iter()
        .map(|(entry, score)| SearchHit::scored(entry, Some(score), MatchType::Fuzzy))
        .collect())
    }

    fn or_fuzzy(&self, hits: Vec<SearchHit>, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        if hits.is_empty() && opts.fallback_fuzzy {
            log::debug!("search mode={} empty, falling back to fuzzy", opts.mode);
            return self.fuzzy(query, opts);
        }
        Ok(hits)
    }

    /// Live one-hop neighbours of `hits` not already among them, by id.
    fn neighbors(&self, hits: &[SearchHit]) -> Result<Vec<Entry>> {
        let present: HashSet<i64> = hits.iter().map(|h| h.entry.id).collect();
        let mut extra = BTreeSet::new();

        for id in &present {
            for relation in self.store.list_relations(*id)? {
                let other = relation.other_end(*id);
                if !present.contains(&other) {
                    extra.insert(other);
                }
            }
        }

        let ids: Vec<i64> = extra.into_iter().collect();
        Ok(self.store.get_entries_by_ids(&ids)?)
    }
}

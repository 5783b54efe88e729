//! Candidate resolution for a surface string.
//!
//! An ordered list of strategies is run until `top_k` distinct entries have
//! been collected:
//!
//! 1. exact, hinted language
//! 2. exact, all languages
//! 3. fuzzy, hinted language
//! 4. fuzzy, all languages
//! 5. substring, re-scored by similarity
//! 6. semantic (ANN, then brute force)
//!
//! An entry keeps the slot and score of the stage that found it first.

use std::collections::HashSet;

use serde::Serialize;

use super::exact::resolve_exact;
use super::fuzzy::resolve_fuzzy;
use super::substring::substring_candidates;
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::semantic::SemanticService;
use crate::store::Store;
use crate::vocab::{Candidate, Language};

/// What a stage may look at.
pub struct ResolveContext<'a> {
    pub store: &'a Store,
    /// `None` skips the semantic stage
    pub semantic: Option<&'a SemanticService>,
}

/// Which entries a stage considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the hinted language; the stage is skipped without a hint
    Hinted,
    All,
}

impl Scope {
    /// `None` = skip this stage; `Some(filter)` = run with that filter.
    fn language(&self, hint: Option<Language>) -> Option<Option<Language>> {
        match self {
            Scope::Hinted => hint.map(Some),
            Scope::All => Some(None),
        }
    }
}

/// One stage of the cascade.
pub trait Strategy {
    fn name(&self) -> &'static str;

    /// Candidates for `query`, best first.
    fn candidates(
        &self,
        ctx: &ResolveContext<'_>,
        query: &str,
        hint: Option<Language>,
        top_k: usize,
    ) -> Result<Vec<Candidate>>;
}

pub struct Exact {
    pub scope: Scope,
}

impl Strategy for Exact {
    fn name(&self) -> &'static str {
        match self.scope {
            Scope::Hinted => "exact_hinted",
            Scope::All => "exact_all",
        }
    }

    fn candidates(
        &self,
        ctx: &ResolveContext<'_>,
        query: &str,
        hint: Option<Language>,
        _top_k: usize,
    ) -> Result<Vec<Candidate>> {
        match self.scope.language(hint) {
            Some(language) => Ok(resolve_exact(ctx.store, query, language)?),
            None => Ok(vec![]),
        }
    }
}

pub struct Fuzzy {
    pub scope: Scope,
    pub threshold: f32,
    /// Pool size as a multiple of `top_k`
    pub pool_factor: usize,
}

impl Strategy for Fuzzy {
    fn name(&self) -> &'static str {
        match self.scope {
            Scope::Hinted => "fuzzy_hinted",
            Scope::All => "fuzzy_all",
        }
    }

    fn candidates(
        &self,
        ctx: &ResolveContext<'_>,
        query: &str,
        hint: Option<Language>,
        top_k: usize,
    ) -> Result<Vec<Candidate>> {
        match self.scope.language(hint) {
            Some(language) => Ok(resolve_fuzzy(
                ctx.store,
                query,
                language,
                self.threshold,
                top_k.saturating_mul(self.pool_factor),
            )?),
            None => Ok(vec![]),
        }
    }
}

pub struct Substring {
    pub pool_factor: usize,
}

impl Strategy for Substring {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn candidates(
        &self,
        ctx: &ResolveContext<'_>,
        query: &str,
        _hint: Option<Language>,
        top_k: usize,
    ) -> Result<Vec<Candidate>> {
        Ok(substring_candidates(ctx.store, query, top_k.saturating_mul(self.pool_factor))?)
    }
}

pub struct Semantic {
    /// Hits scoring below this are dropped
    pub min_score: f32,
}

impl Strategy for Semantic {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn candidates(
        &self,
        ctx: &ResolveContext<'_>,
        query: &str,
        _hint: Option<Language>,
        top_k: usize,
    ) -> Result<Vec<Candidate>> {
        let Some(semantic) = ctx.semantic else {
            return Ok(vec![]);
        };

        let model = semantic.model_or_default(None);
        match semantic.search(ctx.store, model, query, top_k) {
            Ok(hits) => Ok(hits
                .into_iter()
                .filter(|hit| hit.score >= self.min_score)
                .map(|hit| Candidate::from_entry(&hit.entry, hit.score, hit.match_type))
                .collect()),
            Err(e) if e.is_unavailable() => {
                log::debug!("semantic stage skipped: {e}");
                Ok(vec![])
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Outcome of a resolution; `best` is the first of `candidates`.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub best: Option<Candidate>,
    pub candidates: Vec<Candidate>,
}

pub struct Resolver {
    strategies: Vec<Box<dyn Strategy>>,
    language_boost: f32,
}

impl Resolver {
    pub fn new(strategies: Vec<Box<dyn Strategy>>, language_boost: f32) -> Self {
        Self {
            strategies,
            language_boost,
        }
    }

    /// The standard six-stage cascade.
    pub fn from_config(config: &ResolverConfig, semantic_min_score: f32) -> Self {
        Self::new(
            vec![
                Box::new(Exact {
                    scope: Scope::Hinted,
                }),
                Box::new(Exact { scope: Scope::All }),
                Box::new(Fuzzy {
                    scope: Scope::Hinted,
                    threshold: config.fuzzy_hinted_threshold,
                    pool_factor: config.hinted_pool_factor,
                }),
                Box::new(Fuzzy {
                    scope: Scope::All,
                    threshold: config.fuzzy_all_threshold,
                    pool_factor: config.all_pool_factor,
                }),
                Box::new(Substring {
                    pool_factor: config.substring_pool_factor,
                }),
                Box::new(Semantic {
                    min_score: semantic_min_score,
                }),
            ],
            config.language_boost,
        )
    }

    pub fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        query: &str,
        hint: Option<Language>,
        top_k: usize,
    ) -> Result<Resolution> {
        let mut seen = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();

        if !query.trim().is_empty() && top_k > 0 {
            'stages: for strategy in &self.strategies {
                let found = strategy.candidates(ctx, query, hint, top_k)?;
                log::debug!(
                    "resolve stage={} query={query:?} found={} have={}",
                    strategy.name(),
                    found.len(),
                    candidates.len()
                );

                for mut candidate in found {
                    if !seen.insert(candidate.entry_id) {
                        continue;
                    }
                    if Some(candidate.language) == hint {
                        candidate.score += self.language_boost;
                    }
                    candidates.push(candidate);
                    if candidates.len() >= top_k {
                        break 'stages;
                    }
                }
            }
        }

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok(Resolution {
            best: candidates.first().cloned(),
            candidates,
        })
    }
}

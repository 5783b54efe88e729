//! Records annotated with links to entries.
//!
//! Adding or updating a record tokenizes its text, resolves every token and
//! stores the best candidate per token as a link, replacing all previous
//! links. Manual link edits go through `link_record` / `unlink_record`.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Result, VocabError};
use crate::matching::{extract_tokens, ResolveContext, Resolver};
use crate::store::Store;
use crate::vocab::{Candidate, MatchType, NewLink, Record, RecordLink};

/// Queue reason for entries linked from a record.
const RECORD_LINK_REASON: &str = "record_link";

/// One token of a record with its linked entry, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub start: usize,
    pub end: usize,
    pub surface: String,
    pub entry_id: Option<i64>,
    pub score: Option<f32>,
    pub match_type: Option<MatchType>,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedRecord {
    pub record_id: i64,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: Record,
    pub annotations: Vec<Annotation>,
}

/// A manual link request. Missing fields take their defaults: the covered
/// text as surface, `manual` as match type and a score of 1.0.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub record_id: i64,
    pub entry_id: i64,
    pub start: i64,
    pub end: i64,
    pub surface: Option<String>,
    pub match_type: Option<MatchType>,
    pub score: Option<f32>,
}

/// Resolves tokens into annotations.
pub struct Annotator<'a> {
    pub ctx: ResolveContext<'a>,
    pub resolver: &'a Resolver,
    pub top_k: usize,
}

impl Annotator<'_> {
    fn store(&self) -> &Store {
        self.ctx.store
    }

    /// Annotations for `text` together with the links they imply.
    pub fn build(&self, text: &str) -> Result<(Vec<Annotation>, Vec<NewLink>)> {
        let mut annotations = Vec::new();
        let mut links = Vec::new();

        for token in extract_tokens(text) {
            let resolution = self.resolver.resolve(
                &self.ctx,
                &token.surface,
                Some(token.kind.language_hint()),
                self.top_k,
            )?;

            if let Some(best) = &resolution.best {
                links.push(NewLink {
                    entry_id: best.entry_id,
                    start: token.start,
                    end: token.end,
                    surface: token.surface.clone(),
                    match_type: best.match_type,
                    score: best.score,
                });
            }

            annotations.push(Annotation {
                start: token.start,
                end: token.end,
                entry_id: resolution.best.as_ref().map(|b| b.entry_id),
                score: resolution.best.as_ref().map(|b| b.score),
                match_type: resolution.best.as_ref().map(|b| b.match_type),
                surface: token.surface,
                candidates: resolution.candidates,
            });
        }

        Ok((annotations, links))
    }

    /// Resolve first, then write the record, its links and the queue items
    /// in one transaction, so a failed resolution stores nothing.
    pub fn add_record(&self, text: &str) -> Result<AnnotatedRecord> {
        if text.trim().is_empty() {
            return Err(VocabError::missing(&["text"]));
        }

        let text = strip_nul(text);
        let (annotations, links) = self.build(&text)?;
        let record = self
            .store()
            .add_linked_record(&text, &links, RECORD_LINK_REASON)?;
        Ok(self.annotated(record.id, annotations, &links))
    }

    pub fn update_record(&self, record_id: i64, text: &str) -> Result<AnnotatedRecord> {
        if text.trim().is_empty() {
            return Err(VocabError::missing(&["text"]));
        }
        require_record(self.store(), record_id)?;

        let text = strip_nul(text);
        let (annotations, links) = self.build(&text)?;
        if !self
            .store()
            .update_linked_record(record_id, &text, &links, RECORD_LINK_REASON)?
        {
            return Err(VocabError::record_not_found(record_id));
        }
        Ok(self.annotated(record_id, annotations, &links))
    }

    fn annotated(
        &self,
        record_id: i64,
        annotations: Vec<Annotation>,
        links: &[NewLink],
    ) -> AnnotatedRecord {
        log::debug!(
            "annotated record id={record_id} tokens={} links={}",
            annotations.len(),
            links.len()
        );
        AnnotatedRecord {
            record_id,
            annotations,
        }
    }
}

/// Stored text has NUL characters removed; offsets are computed on that.
fn strip_nul(text: &str) -> String {
    text.replace('\0', "")
}

/// Annotations rebuilt from stored links over a fresh tokenization. Tokens
/// without a link at their exact span stay unlinked; no candidates.
pub fn annotations_from_links(text: &str, links: &[RecordLink]) -> Vec<Annotation> {
    let by_span: HashMap<(usize, usize), &RecordLink> =
        links.iter().map(|l| ((l.start, l.end), l)).collect();

    extract_tokens(text)
        .into_iter()
        .map(|token| {
            let link = by_span.get(&(token.start, token.end));
            Annotation {
                start: token.start,
                end: token.end,
                surface: token.surface,
                entry_id: link.map(|l| l.entry_id),
                score: link.map(|l| l.score),
                match_type: link.map(|l| l.match_type),
                candidates: vec![],
            }
        })
        .collect()
}

fn require_record(store: &Store, record_id: i64) -> Result<Record> {
    store
        .get_record(record_id)?
        .ok_or_else(|| VocabError::record_not_found(record_id))
}

fn current_annotations(store: &Store, record: &Record) -> Result<Vec<Annotation>> {
    let links = store.fetch_record_links(record.id)?;
    Ok(annotations_from_links(&record.text, &links))
}

pub fn get_record(store: &Store, record_id: i64) -> Result<RecordView> {
    let record = require_record(store, record_id)?;
    let annotations = current_annotations(store, &record)?;
    Ok(RecordView {
        record,
        annotations,
    })
}

/// Link `entry_id` to a span of the record, replacing whatever was linked at
/// that exact span.
pub fn link_record(store: &Store, req: &LinkRequest) -> Result<Vec<Annotation>> {
    let record = require_record(store, req.record_id)?;

    let len = record.text.chars().count();
    if req.start < 0 || req.end as i128 > len as i128 || req.start >= req.end {
        return Err(VocabError::BadRange {
            start: req.start,
            end: req.end,
            len,
        });
    }
    let (start, end) = (req.start as usize, req.end as usize);

    if store.get_live_entry(req.entry_id)?.is_none() {
        return Err(VocabError::entry_not_found(req.entry_id));
    }

    let surface = match req.surface.as_deref().filter(|s| !s.is_empty()) {
        Some(surface) => surface.to_string(),
        None => record.text.chars().skip(start).take(end - start).collect(),
    };

    let mut links: Vec<NewLink> = store
        .fetch_record_links(record.id)?
        .iter()
        .filter(|l| !(l.start == start && l.end == end))
        .map(NewLink::from)
        .collect();
    links.push(NewLink {
        entry_id: req.entry_id,
        start,
        end,
        surface,
        match_type: req.match_type.unwrap_or(MatchType::Manual),
        score: req.score.unwrap_or(1.0),
    });
    store.replace_record_links(record.id, &links)?;

    current_annotations(store, &record)
}

/// Remove the link of `entry_id` at `[start, end)`. Missing links are not an
/// error.
pub fn unlink_record(
    store: &Store,
    record_id: i64,
    entry_id: i64,
    start: i64,
    end: i64,
) -> Result<Vec<Annotation>> {
    let record = require_record(store, record_id)?;

    let links: Vec<NewLink> = store
        .fetch_record_links(record_id)?
        .iter()
        .filter(|l| !(l.entry_id == entry_id && l.start as i64 == start && l.end as i64 == end))
        .map(NewLink::from)
        .collect();
    store.replace_record_links(record_id, &links)?;

    current_annotations(store, &record)
}

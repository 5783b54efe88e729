//! Line-oriented JSON request dispatcher.
//!
//! Each input line is `{"id", "cmd", "payload"}`; each output line is
//! `{"id", "ok": true, "data"}` or `{"id", "ok": false, "error": {"code",
//! "message"}}`. Handlers are thin: they parse the payload, call into the
//! library and serialize the result.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::annotate::{self, Annotator, LinkRequest};
use crate::config::Config;
use crate::error::{Result, VocabError};
use crate::graph::{self, SynonymQuery};
use crate::matching::linking::auto_link;
use crate::matching::{ResolveContext, Resolver};
use crate::search::{SearchOptions, Searcher};
use crate::semantic::SemanticService;
use crate::store::{Store, StoreError};
use crate::vocab::{EntryUpdate, Language, MatchType, NewEntry};

/// Commands understood by [`Dispatcher::handle`].
pub const COMMANDS: [&str; 22] = [
    "ping",
    "add_entry",
    "get_entry",
    "update_entry",
    "delete_entry",
    "list_entries",
    "upsert_relation",
    "list_relations",
    "search_entries",
    "add_record",
    "update_record",
    "get_record",
    "list_records",
    "link_record",
    "unlink_record",
    "resolve_entry",
    "get_synonyms",
    "semantic_status",
    "rebuild_embeddings",
    "ann_status",
    "rebuild_ann_index",
    "ann_apply_updates",
];

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(id: Value, data: Value) -> Self {
        Self {
            id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: Value, code: &str, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IdRequest {
    id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecordIdRequest {
    record_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct AddEntryRequest {
    language: Option<Language>,
    word: Option<String>,
    translation: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateEntryRequest {
    id: Option<i64>,
    #[serde(flatten)]
    update: EntryUpdate,
}

#[derive(Debug, Default, Deserialize)]
struct ListRequest {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    include_deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
struct UpsertRelationRequest {
    from_id: Option<i64>,
    to_id: Option<i64>,
    #[serde(rename = "type")]
    rel_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    q: String,
    #[serde(default)]
    mode: String,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    expand_relations: bool,
    #[serde(default = "default_true")]
    fallback_fuzzy: bool,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RecordTextRequest {
    record_id: Option<i64>,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LinkRecordRequest {
    record_id: Option<i64>,
    entry_id: Option<i64>,
    start: Option<i64>,
    end: Option<i64>,
    surface: Option<String>,
    match_type: Option<String>,
    score: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ResolveRequest {
    #[serde(default)]
    q: String,
    language: Option<Language>,
    #[serde(rename = "topK")]
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SynonymsRequest {
    #[serde(default)]
    q: String,
    language: Option<Language>,
    #[serde(default = "default_depth")]
    depth: usize,
    #[serde(rename = "topK", default = "default_synonym_top_k")]
    top_k: usize,
    #[serde(default = "default_true")]
    fallback: bool,
    #[serde(rename = "includeTypes", default)]
    include_types: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelRequest {
    model: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_depth() -> usize {
    2
}

fn default_synonym_top_k() -> usize {
    20
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T> {
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload).map_err(|e| VocabError::BadRequest(e.to_string()))
}

fn to_data<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| VocabError::Internal(e.to_string()))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| VocabError::missing(&[field]))
}

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    required(value.filter(|v| !v.trim().is_empty()), field)
}

/// Owns everything a command may touch for the lifetime of the process.
pub struct Dispatcher {
    store: Store,
    config: Config,
    semantic: SemanticService,
    resolver: Resolver,
}

impl Dispatcher {
    pub fn new(store: Store, config: Config) -> Self {
        let semantic = SemanticService::new(&config);
        let resolver = Resolver::from_config(&config.resolver, config.semantic.min_score);
        Self {
            store,
            config,
            semantic,
            resolver,
        }
    }

    /// Open the configured database.
    pub fn open(config: Config) -> Result<Self, StoreError> {
        let store = Store::open(config.database_path())?;
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ctx(&self) -> ResolveContext<'_> {
        ResolveContext {
            store: &self.store,
            semantic: self.semantic.is_enabled().then_some(&self.semantic),
        }
    }

    fn annotator(&self) -> Annotator<'_> {
        Annotator {
            ctx: self.ctx(),
            resolver: &self.resolver,
            top_k: self.config.resolver.top_k,
        }
    }

    fn limit(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.config.search.default_limit)
    }

    /// Run one command.
    pub fn handle(&self, cmd: &str, payload: Value) -> Result<Value> {
        match cmd {
            "ping" => Ok(json!("pong")),
            "add_entry" => self.add_entry(parse(payload)?),
            "get_entry" => {
                let req: IdRequest = parse(payload)?;
                let id = required(req.id, "id")?;
                let entry = self
                    .store
                    .get_entry(id)?
                    .ok_or_else(|| VocabError::entry_not_found(id))?;
                to_data(entry)
            }
            "update_entry" => {
                let req: UpdateEntryRequest = parse(payload)?;
                let id = required(req.id, "id")?;
                if req.update.is_empty() {
                    return Err(VocabError::missing(&["language", "word", "translation", "notes"]));
                }
                if req.update.word.as_deref().is_some_and(|w| w.trim().is_empty()) {
                    return Err(VocabError::missing(&["word"]));
                }
                let updated = self.store.update_entry(id, &req.update)?;
                Ok(json!({ "updated": updated }))
            }
            "delete_entry" => {
                let req: IdRequest = parse(payload)?;
                let deleted = self.store.soft_delete_entry(required(req.id, "id")?)?;
                Ok(json!({ "deleted": deleted }))
            }
            "list_entries" => {
                let req: ListRequest = parse(payload)?;
                to_data(self.store.list_entries(
                    self.limit(req.limit),
                    req.offset,
                    req.include_deleted,
                )?)
            }
            "upsert_relation" => self.upsert_relation(parse(payload)?),
            "list_relations" => {
                let req: IdRequest = parse(payload)?;
                to_data(self.store.list_relations(required(req.id, "id")?)?)
            }
            "search_entries" => self.search_entries(parse(payload)?),
            "add_record" => {
                let req: RecordTextRequest = parse(payload)?;
                to_data(self.annotator().add_record(&required_text(req.text, "text")?)?)
            }
            "update_record" => {
                let req: RecordTextRequest = parse(payload)?;
                let record_id = required(req.record_id, "record_id")?;
                let text = required_text(req.text, "text")?;
                to_data(self.annotator().update_record(record_id, &text)?)
            }
            "get_record" => {
                let req: RecordIdRequest = parse(payload)?;
                to_data(annotate::get_record(
                    &self.store,
                    required(req.record_id, "record_id")?,
                )?)
            }
            "list_records" => {
                let req: ListRequest = parse(payload)?;
                to_data(self.store.list_records(self.limit(req.limit), req.offset)?)
            }
            "link_record" => self.link_record(parse(payload)?),
            "unlink_record" => {
                let req: LinkRecordRequest = parse(payload)?;
                let annotations = annotate::unlink_record(
                    &self.store,
                    required(req.record_id, "record_id")?,
                    required(req.entry_id, "entry_id")?,
                    required(req.start, "start")?,
                    required(req.end, "end")?,
                )?;
                Ok(json!({ "ok": true, "annotations": to_data(annotations)? }))
            }
            "resolve_entry" => {
                let req: ResolveRequest = parse(payload)?;
                let q = required_text(Some(req.q), "q")?;
                let top_k = req.top_k.unwrap_or(self.config.resolver.top_k);
                to_data(self.resolver.resolve(&self.ctx(), &q, req.language, top_k)?)
            }
            "get_synonyms" => {
                let req: SynonymsRequest = parse(payload)?;
                let query = SynonymQuery {
                    query: req.q,
                    language: req.language,
                    depth: req.depth,
                    top_k: req.top_k,
                    fallback: req.fallback,
                    include_types: req.include_types,
                };
                to_data(graph::synonyms(&self.ctx(), &self.resolver, &query)?)
            }
            "semantic_status" => {
                let req: ModelRequest = parse(payload)?;
                let model = self.semantic.model_or_default(req.model.as_deref());
                to_data(self.semantic.status(&self.store, model)?)
            }
            "rebuild_embeddings" => {
                let req: ModelRequest = parse(payload)?;
                let model = self.semantic.model_or_default(req.model.as_deref());
                let rebuilt = self.semantic.rebuild_embeddings(&self.store, model)?;
                Ok(json!({ "rebuilt": rebuilt }))
            }
            "ann_status" => {
                let req: ModelRequest = parse(payload)?;
                let model = self.semantic.model_or_default(req.model.as_deref());
                to_data(self.semantic.ann_status(&self.store, model)?)
            }
            "rebuild_ann_index" => {
                let req: ModelRequest = parse(payload)?;
                let model = self.semantic.model_or_default(req.model.as_deref());
                let build = self.semantic.rebuild_ann(&self.store, model)?;
                Ok(json!({ "rebuilt": build.count }))
            }
            "ann_apply_updates" => {
                let req: ModelRequest = parse(payload)?;
                let model = self.semantic.model_or_default(req.model.as_deref());
                to_data(self.semantic.apply_updates(&self.store, model)?)
            }
            other => Err(VocabError::UnknownCommand(other.to_string())),
        }
    }

    fn add_entry(&self, req: AddEntryRequest) -> Result<Value> {
        let mut missing = Vec::new();
        if req.language.is_none() {
            missing.push("language");
        }
        if req.word.as_deref().map_or(true, |w| w.trim().is_empty()) {
            missing.push("word");
        }
        let (Some(language), Some(word), true) = (req.language, req.word, missing.is_empty()) else {
            return Err(VocabError::missing(&missing));
        };

        let mut new = NewEntry::new(language, word);
        new.translation = req.translation;
        new.notes = req.notes;

        let entry = self.store.add_entry(&new)?;
        let linked_relations = auto_link(&self.store, &entry, &self.config.linking)?;
        log::info!(
            "added entry id={} language={} relations={}",
            entry.id,
            entry.language,
            linked_relations.len()
        );
        Ok(json!({ "id": entry.id, "linked_relations": linked_relations }))
    }

    fn upsert_relation(&self, req: UpsertRelationRequest) -> Result<Value> {
        let from_id = required(req.from_id, "from_id")?;
        let to_id = required(req.to_id, "to_id")?;
        let rel_type = required_text(req.rel_type, "type")?;
        if from_id == to_id {
            return Err(VocabError::BadRequest(
                "an entry cannot relate to itself".to_string(),
            ));
        }
        for id in [from_id, to_id] {
            if self.store.get_live_entry(id)?.is_none() {
                return Err(VocabError::entry_not_found(id));
            }
        }

        let id = self.store.upsert_relation(from_id, to_id, rel_type.trim())?;
        Ok(json!({ "id": id }))
    }

    fn search_entries(&self, req: SearchRequest) -> Result<Value> {
        let opts = SearchOptions {
            mode: req.mode.parse()?,
            limit: self.limit(req.limit),
            offset: req.offset,
            fallback_fuzzy: req.fallback_fuzzy,
            expand_relations: req.expand_relations,
            model: req.model,
        };
        let searcher = Searcher {
            store: &self.store,
            semantic: &self.semantic,
            config: &self.config.search,
        };
        to_data(searcher.search(&req.q, &opts)?)
    }

    fn link_record(&self, req: LinkRecordRequest) -> Result<Value> {
        let match_type = req
            .match_type
            .as_deref()
            .map(str::parse::<MatchType>)
            .transpose()
            .map_err(VocabError::BadRequest)?;

        let link = LinkRequest {
            record_id: required(req.record_id, "record_id")?,
            entry_id: required(req.entry_id, "entry_id")?,
            start: required(req.start, "start")?,
            end: required(req.end, "end")?,
            surface: req.surface,
            match_type,
            score: req.score,
        };
        let annotations = annotate::link_record(&self.store, &link)?;
        Ok(json!({ "ok": true, "annotations": to_data(annotations)? }))
    }

    /// Run a parsed request and wrap the outcome.
    pub fn respond(&self, request: Request) -> Response {
        let Some(cmd) = request.cmd.filter(|c| !c.is_empty()) else {
            return Response::err(request.id, "unknown_cmd", "unknown cmd None");
        };

        match self.handle(&cmd, request.payload) {
            Ok(data) => Response::ok(request.id, data),
            Err(e) => {
                match &e {
                    VocabError::Store(_) | VocabError::Internal(_) => {
                        log::error!("command failed cmd={cmd} error={e}")
                    }
                    _ => log::debug!("command rejected cmd={cmd} code={} error={e}", e.code()),
                }
                Response::err(request.id, e.code(), e.to_string())
            }
        }
    }

    /// Handle one raw input line. Blank lines produce no response.
    pub fn handle_line(&self, line: &str) -> Option<Response> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<Request>(line) {
            Ok(request) => Some(self.respond(request)),
            Err(e) => {
                log::warn!("unparsable request line: {e}");
                Some(Response::err(Value::Null, "invalid_json", "cannot parse line"))
            }
        }
    }

    /// Serve requests from `input` until EOF, one response line per request.
    pub fn serve(&self, input: impl BufRead, mut output: impl Write) -> std::io::Result<()> {
        log::info!("serving requests on stdin");
        for line in input.lines() {
            let Some(response) = self.handle_line(&line?) else {
                continue;
            };
            let encoded = serde_json::to_string(&response)?;
            writeln!(output, "{encoded}")?;
            output.flush()?;
        }
        log::info!("input closed, exiting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        let mut config = Config::with_base_path(std::env::temp_dir());
        config.semantic.enabled = false;
        Dispatcher::new(Store::open_in_memory().unwrap(), config)
    }

    fn code(d: &Dispatcher, cmd: &str, payload: Value) -> String {
        d.handle(cmd, payload).unwrap_err().code().to_string()
    }

    #[test]
    fn test_ping_and_unknown() {
        let d = dispatcher();
        assert_eq!(d.handle("ping", Value::Null).unwrap(), json!("pong"));
        assert_eq!(code(&d, "frobnicate", json!({})), "unknown_cmd");
    }

    #[test]
    fn test_entry_lifecycle() {
        let d = dispatcher();
        let added = d
            .handle("add_entry", json!({"language": "en", "word": "calm", "translation": "平静"}))
            .unwrap();
        let id = added["id"].as_i64().unwrap();

        let entry = d.handle("get_entry", json!({ "id": id })).unwrap();
        assert_eq!(entry["word"], "calm");
        assert_eq!(entry["language"], "en");

        let updated = d
            .handle("update_entry", json!({"id": id, "notes": "quiet"}))
            .unwrap();
        assert_eq!(updated, json!({"updated": true}));

        let deleted = d.handle("delete_entry", json!({ "id": id })).unwrap();
        assert_eq!(deleted, json!({"deleted": true}));
        let deleted = d.handle("delete_entry", json!({ "id": id })).unwrap();
        assert_eq!(deleted, json!({"deleted": false}));

        let live = d.handle("list_entries", json!({})).unwrap();
        assert_eq!(live.as_array().unwrap().len(), 0);
        let all = d.handle("list_entries", json!({"include_deleted": true})).unwrap();
        assert_eq!(all.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_error_codes() {
        let d = dispatcher();
        assert_eq!(code(&d, "add_entry", json!({"language": "en"})), "missing_fields");
        assert_eq!(code(&d, "add_entry", json!({"language": "fr", "word": "x"})), "bad_request");
        assert_eq!(code(&d, "get_entry", json!({})), "missing_fields");
        assert_eq!(code(&d, "get_entry", json!({"id": 77})), "not_found");
        assert_eq!(code(&d, "resolve_entry", json!({"q": ""})), "missing_fields");
        assert_eq!(code(&d, "search_entries", json!({"q": "a", "mode": "regex"})), "bad_request");
        assert_eq!(code(&d, "rebuild_embeddings", json!({})), "semantic_unavailable");
        assert_eq!(
            code(&d, "search_entries", json!({"q": "a", "mode": "semantic"})),
            "semantic_unavailable"
        );
        let status = d.handle("semantic_status", json!({})).unwrap();
        assert_eq!(status["enabled"], false);

        let record = d.handle("add_record", json!({"text": "abc"})).unwrap();
        let entry = d.handle("add_entry", json!({"language": "en", "word": "abc"})).unwrap();
        assert_eq!(
            code(
                &d,
                "link_record",
                json!({"record_id": record["record_id"], "entry_id": entry["id"], "start": 2, "end": 9})
            ),
            "bad_range"
        );
    }

    #[test]
    fn test_search_empty_query() {
        let d = dispatcher();
        assert_eq!(d.handle("search_entries", json!({})).unwrap(), json!([]));
    }

    #[test]
    fn test_serve_lines() {
        let d = dispatcher();
        let input = concat!(
            "{\"id\": 1, \"cmd\": \"ping\"}\n",
            "\n",
            "not json\n",
            "{\"id\": \"x\", \"cmd\": \"nope\", \"payload\": {}}\n",
        );
        let mut out = Vec::new();
        d.serve(input.as_bytes(), &mut out).unwrap();

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], json!({"id": 1, "ok": true, "data": "pong"}));
        assert_eq!(lines[1]["error"]["code"], "invalid_json");
        assert_eq!(lines[1]["id"], Value::Null);
        assert_eq!(lines[2]["id"], "x");
        assert_eq!(lines[2]["error"]["code"], "unknown_cmd");
    }

    #[test]
    fn test_huge_top_k() {
        let d = dispatcher();
        d.handle("add_entry", json!({"language": "en", "word": "calm"}))
            .unwrap();

        let resolved = d
            .handle("resolve_entry", json!({"q": "calm", "topK": u64::MAX}))
            .unwrap();
        assert_eq!(resolved["best"]["word"], "calm");

        let synonyms = d
            .handle("get_synonyms", json!({"q": "zzz", "topK": u64::MAX}))
            .unwrap();
        assert!(synonyms["graph_results"].as_array().unwrap().is_empty());
    }
}

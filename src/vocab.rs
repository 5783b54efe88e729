use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Relation type linking two entries that mean the same thing in one language.
pub const REL_SYNONYM: &str = "synonym";
/// Relation type linking an entry to its counterpart in the other language.
pub const REL_TRANSLATION: &str = "translation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            other => Err(format!("unknown language {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub language: Language,
    pub word: String,
    pub translation: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn translation_str(&self) -> &str {
        self.translation.as_deref().unwrap_or_default()
    }

    pub fn notes_str(&self) -> &str {
        self.notes.as_deref().unwrap_or_default()
    }

    /// Text fed to the embedding model: word, translation and notes joined
    /// by single spaces. `None` when all three are blank.
    pub fn embedding_text(&self) -> Option<String> {
        let text = [self.word.as_str(), self.translation_str(), self.notes_str()]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewEntry {
    pub language: Language,
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewEntry {
    pub fn new(language: Language, word: impl Into<String>) -> Self {
        Self {
            language,
            word: word.into(),
            translation: None,
            notes: None,
        }
    }

    pub fn with_translation(mut self, translation: impl Into<String>) -> Self {
        self.translation = Some(translation.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.word.is_none()
            && self.translation.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    /// The endpoint on the other side of `current`.
    pub fn other_end(&self, current: i64) -> i64 {
        if self.from_id == current {
            self.to_id
        } else {
            self.from_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordLink {
    pub record_id: i64,
    pub entry_id: i64,
    pub start: usize,
    pub end: usize,
    pub surface: String,
    pub match_type: MatchType,
    pub score: f32,
    pub created_at: DateTime<Utc>,
}

/// A link about to be written; `record_id` and `created_at` are assigned by
/// the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLink {
    pub entry_id: i64,
    pub start: usize,
    pub end: usize,
    pub surface: String,
    pub match_type: MatchType,
    pub score: f32,
}

impl From<&RecordLink> for NewLink {
    fn from(link: &RecordLink) -> Self {
        NewLink {
            entry_id: link.entry_id,
            start: link.start,
            end: link.end,
            surface: link.surface.clone(),
            match_type: link.match_type,
            score: link.score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOp {
    Upsert,
    Delete,
}

impl QueueOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueOp::Upsert => "upsert",
            QueueOp::Delete => "delete",
        }
    }
}

impl FromStr for QueueOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(QueueOp::Upsert),
            "delete" => Ok(QueueOp::Delete),
            other => Err(format!("unknown queue op {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub entry_id: i64,
    pub op: QueueOp,
    pub queued_at: DateTime<Utc>,
    pub reason: String,
}

/// How a candidate or a link was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactWord,
    ExactTranslation,
    FuzzyWord,
    FuzzyTranslation,
    Fuzzy,
    Substring,
    Fts,
    Semantic,
    SemanticAnn,
    Manual,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::ExactWord => "exact_word",
            MatchType::ExactTranslation => "exact_translation",
            MatchType::FuzzyWord => "fuzzy_word",
            MatchType::FuzzyTranslation => "fuzzy_translation",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Substring => "substring",
            MatchType::Fts => "fts",
            MatchType::Semantic => "semantic",
            MatchType::SemanticAnn => "semantic_ann",
            MatchType::Manual => "manual",
        }
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let match_type = match s {
            "exact_word" => MatchType::ExactWord,
            "exact_translation" => MatchType::ExactTranslation,
            "fuzzy_word" => MatchType::FuzzyWord,
            "fuzzy_translation" => MatchType::FuzzyTranslation,
            "fuzzy" => MatchType::Fuzzy,
            "substring" | "like" => MatchType::Substring,
            "fts" => MatchType::Fts,
            "semantic" => MatchType::Semantic,
            "semantic_ann" => MatchType::SemanticAnn,
            "manual" => MatchType::Manual,
            other => return Err(format!("unknown match type {other:?}")),
        };
        Ok(match_type)
    }
}

/// A scored entry produced by a matching strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub entry_id: i64,
    pub language: Language,
    pub word: String,
    pub score: f32,
    pub match_type: MatchType,
}

impl Candidate {
    pub fn from_entry(entry: &Entry, score: f32, match_type: MatchType) -> Self {
        Candidate {
            entry_id: entry.id,
            language: entry.language,
            word: entry.word.clone(),
            score,
            match_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(word: &str, translation: Option<&str>, notes: Option<&str>) -> Entry {
        let now = Utc::now();
        Entry {
            id: 1,
            language: Language::En,
            word: word.to_string(),
            translation: translation.map(str::to_string),
            notes: notes.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_embedding_text_skips_blank_fields() {
        let e = entry("resilient", Some("  "), Some("able to recover"));
        assert_eq!(e.embedding_text().as_deref(), Some("resilient able to recover"));

        let blank = entry(" ", None, None);
        assert!(blank.embedding_text().is_none());
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!("zh".parse::<Language>().unwrap(), Language::Zh);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn test_match_type_wire_names() {
        for mt in [
            MatchType::ExactWord,
            MatchType::FuzzyTranslation,
            MatchType::SemanticAnn,
            MatchType::Manual,
        ] {
            assert_eq!(mt.as_str().parse::<MatchType>().unwrap(), mt);
            let json = serde_json::to_string(&mt).unwrap();
            assert_eq!(json, format!("\"{}\"", mt.as_str()));
        }
    }

    #[test]
    fn test_relation_other_end() {
        let rel = Relation {
            id: 1,
            from_id: 3,
            to_id: 7,
            rel_type: REL_SYNONYM.to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(rel.other_end(3), 7);
        assert_eq!(rel.other_end(7), 3);
    }
}

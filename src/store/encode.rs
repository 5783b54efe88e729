//! Conversions between domain types and the plain column values stored in
//! SQLite.
//!
//! Timestamps are RFC 3339 strings with microsecond precision. Embedding
//! vectors are packed little-endian `f32` blobs.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;

use super::{Result, StoreError};
use crate::vocab::{Entry, QueueItem, Record, RecordLink, Relation};

pub const ENTRY_COLUMNS: &str =
    "id, language, word, translation, notes, created_at, updated_at, deleted_at";
pub const RELATION_COLUMNS: &str = "id, from_id, to_id, type, created_at";
pub const RECORD_COLUMNS: &str = "id, text, created_at, updated_at";
pub const LINK_COLUMNS: &str =
    "record_id, entry_id, start, \"end\", surface, match_type, score, created_at";
pub const QUEUE_COLUMNS: &str = "id, entry_id, op, queued_at, reason";

// ─── Scalars ──────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::DateParse(e.to_string()))
}

pub fn now() -> String {
    encode_dt(Utc::now())
}

/// Strip NUL characters, which SQLite text handling truncates at.
pub fn clean_text(s: &str) -> String {
    s.replace('\0', "")
}

/// Blank optional text is stored as NULL.
pub fn clean_optional(s: Option<&str>) -> Option<String> {
    s.map(clean_text).filter(|s| !s.trim().is_empty())
}

pub fn pack_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn unpack_vector(bytes: &[u8], dim: usize) -> Result<Vec<f32>> {
    if bytes.len() != dim * 4 {
        return Err(StoreError::Decode(format!(
            "vector blob has {} bytes, expected {} for dim {dim}",
            bytes.len(),
            dim * 4
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

pub struct RawEntry {
    pub id: i64,
    pub language: String,
    pub word: String,
    pub translation: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl RawEntry {
    /// Reads the columns listed in [`ENTRY_COLUMNS`], starting at `offset`.
    pub fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(RawEntry {
            id: row.get(offset)?,
            language: row.get(offset + 1)?,
            word: row.get(offset + 2)?,
            translation: row.get(offset + 3)?,
            notes: row.get(offset + 4)?,
            created_at: row.get(offset + 5)?,
            updated_at: row.get(offset + 6)?,
            deleted_at: row.get(offset + 7)?,
        })
    }

    pub fn into_entry(self) -> Result<Entry> {
        Ok(Entry {
            id: self.id,
            language: self.language.parse().map_err(StoreError::Decode)?,
            word: self.word,
            translation: self.translation,
            notes: self.notes,
            created_at: decode_dt(&self.created_at)?,
            updated_at: decode_dt(&self.updated_at)?,
            deleted_at: self.deleted_at.as_deref().map(decode_dt).transpose()?,
        })
    }
}

pub struct RawRelation {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub rel_type: String,
    pub created_at: String,
}

impl RawRelation {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawRelation {
            id: row.get(0)?,
            from_id: row.get(1)?,
            to_id: row.get(2)?,
            rel_type: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub fn into_relation(self) -> Result<Relation> {
        Ok(Relation {
            id: self.id,
            from_id: self.from_id,
            to_id: self.to_id,
            rel_type: self.rel_type,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

pub struct RawRecord {
    pub id: i64,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RawRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawRecord {
            id: row.get(0)?,
            text: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    pub fn into_record(self) -> Result<Record> {
        Ok(Record {
            id: self.id,
            text: self.text,
            created_at: decode_dt(&self.created_at)?,
            updated_at: decode_dt(&self.updated_at)?,
        })
    }
}

pub struct RawLink {
    pub record_id: i64,
    pub entry_id: i64,
    pub start: i64,
    pub end: i64,
    pub surface: String,
    pub match_type: String,
    pub score: f64,
    pub created_at: String,
}

impl RawLink {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawLink {
            record_id: row.get(0)?,
            entry_id: row.get(1)?,
            start: row.get(2)?,
            end: row.get(3)?,
            surface: row.get(4)?,
            match_type: row.get(5)?,
            score: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    pub fn into_link(self) -> Result<RecordLink> {
        let offset = |v: i64| {
            usize::try_from(v).map_err(|_| StoreError::Decode(format!("negative offset {v}")))
        };

        Ok(RecordLink {
            record_id: self.record_id,
            entry_id: self.entry_id,
            start: offset(self.start)?,
            end: offset(self.end)?,
            surface: self.surface,
            match_type: self.match_type.parse().map_err(StoreError::Decode)?,
            score: self.score as f32,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

pub struct RawQueueItem {
    pub id: i64,
    pub entry_id: i64,
    pub op: String,
    pub queued_at: String,
    pub reason: String,
}

impl RawQueueItem {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawQueueItem {
            id: row.get(0)?,
            entry_id: row.get(1)?,
            op: row.get(2)?,
            queued_at: row.get(3)?,
            reason: row.get(4)?,
        })
    }

    pub fn into_item(self) -> Result<QueueItem> {
        Ok(QueueItem {
            id: self.id,
            entry_id: self.entry_id,
            op: self.op.parse().map_err(StoreError::Decode)?,
            queued_at: decode_dt(&self.queued_at)?,
            reason: self.reason,
        })
    }
}

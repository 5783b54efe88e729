use rusqlite::{params, OptionalExtension};

use super::encode::{clean_optional, clean_text, now, RawEntry, ENTRY_COLUMNS};
use super::{Result, Store};
use crate::vocab::{Entry, EntryUpdate, Language, NewEntry, QueueOp};

impl Store {
    /// Insert a new entry and queue it for indexing.
    pub fn add_entry(&self, new: &NewEntry) -> Result<Entry> {
        let ts = now();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO entries (language, word, translation, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                new.language.as_str(),
                clean_text(new.word.trim()),
                clean_optional(new.translation.as_deref()),
                clean_optional(new.notes.as_deref()),
                ts,
            ],
        )?;
        let id = tx.last_insert_rowid();
        Self::enqueue_in(&tx, id, QueueOp::Upsert, "entry_created")?;
        tx.commit()?;

        log::debug!("added entry id={id} language={}", new.language);
        self.require_entry(id)
    }

    /// Fetch an entry by id, including soft-deleted rows.
    pub fn get_entry(&self, id: i64) -> Result<Option<Entry>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                params![id],
                |row| RawEntry::from_row(row, 0),
            )
            .optional()?;

        raw.map(RawEntry::into_entry).transpose()
    }

    pub fn get_live_entry(&self, id: i64) -> Result<Option<Entry>> {
        Ok(self.get_entry(id)?.filter(Entry::is_live))
    }

    fn require_entry(&self, id: i64) -> Result<Entry> {
        self.get_entry(id)?
            .ok_or_else(|| super::StoreError::Decode(format!("entry {id} vanished after write")))
    }

    /// Apply `update` to a live entry. Returns `false` when the entry does not
    /// exist or is deleted.
    pub fn update_entry(&self, id: i64, update: &EntryUpdate) -> Result<bool> {
        let Some(current) = self.get_live_entry(id)? else {
            return Ok(false);
        };

        let language = update.language.unwrap_or(current.language);
        let word = match &update.word {
            Some(word) => clean_text(word.trim()),
            None => current.word,
        };
        let translation = match &update.translation {
            Some(t) => clean_optional(Some(t)),
            None => current.translation,
        };
        let notes = match &update.notes {
            Some(n) => clean_optional(Some(n)),
            None => current.notes,
        };

        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE entries
             SET language = ?1, word = ?2, translation = ?3, notes = ?4, updated_at = ?5
             WHERE id = ?6 AND deleted_at IS NULL",
            params![language.as_str(), word, translation, notes, now(), id],
        )?;
        if changed > 0 {
            Self::enqueue_in(&tx, id, QueueOp::Upsert, "entry_updated")?;
        }
        tx.commit()?;

        Ok(changed > 0)
    }

    /// Mark a live entry deleted. Relations and links are left in place.
    pub fn soft_delete_entry(&self, id: i64) -> Result<bool> {
        let ts = now();
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE entries SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![ts, id],
        )?;
        if changed > 0 {
            Self::enqueue_in(&tx, id, QueueOp::Delete, "entry_deleted")?;
        }
        tx.commit()?;

        if changed > 0 {
            log::debug!("soft-deleted entry id={id}");
        }
        Ok(changed > 0)
    }

    /// Most recently updated first.
    pub fn list_entries(
        &self,
        limit: usize,
        offset: usize,
        include_deleted: bool,
    ) -> Result<Vec<Entry>> {
        let filter = if include_deleted {
            ""
        } else {
            "WHERE deleted_at IS NULL"
        };
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries {filter}
             ORDER BY updated_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                RawEntry::from_row(row, 0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raws.into_iter().map(RawEntry::into_entry).collect()
    }

    /// Live entries for `ids`, in the order given. Missing or deleted ids are
    /// skipped.
    pub fn get_entries_by_ids(&self, ids: &[i64]) -> Result<Vec<Entry>> {
        let mut entries = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(entry) = self.get_live_entry(id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// All live entries in id order, optionally restricted to one language.
    pub fn live_entries(&self, language: Option<Language>) -> Result<Vec<Entry>> {
        let raws = match language {
            Some(lang) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE deleted_at IS NULL AND language = ?1 ORDER BY id"
                ))?;
                let rows = stmt
                    .query_map(params![lang.as_str()], |row| RawEntry::from_row(row, 0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries WHERE deleted_at IS NULL ORDER BY id"
                ))?;
                let rows = stmt
                    .query_map([], |row| RawEntry::from_row(row, 0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };

        raws.into_iter().map(RawEntry::into_entry).collect()
    }
}

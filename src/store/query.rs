use rusqlite::params;

use super::encode::{RawEntry, ENTRY_COLUMNS};
use super::{Result, Store};
use crate::vocab::Entry;

/// A full-text hit. `rank` is the raw `bm25()` value, lower is better.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub entry: Entry,
    pub rank: f64,
    pub snippet: Option<String>,
}

/// Quote every whitespace-separated term so user input is matched literally
/// instead of being parsed as FTS5 query syntax.
pub fn fts_query(q: &str) -> String {
    q.split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn prefixed_entry_columns(alias: &str) -> String {
    ENTRY_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Store {
    /// Live entries whose word, translation or notes contain `q`
    /// (case-sensitive), most recently updated first.
    pub fn substring_entries(&self, q: &str, limit: usize, offset: usize) -> Result<Vec<Entry>> {
        if q.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE deleted_at IS NULL
               AND (instr(word, ?1) > 0
                    OR instr(coalesce(translation, ''), ?1) > 0
                    OR instr(coalesce(notes, ''), ?1) > 0)
             ORDER BY updated_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let raws = stmt
            .query_map(params![q, limit as i64, offset as i64], |row| {
                RawEntry::from_row(row, 0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raws.into_iter().map(RawEntry::into_entry).collect()
    }

    /// Full-text search over live entries, best `bm25` rank first.
    pub fn fts_entries(&self, q: &str, limit: usize, offset: usize) -> Result<Vec<FtsHit>> {
        let query = fts_query(q);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}, bm25(entries_fts) AS bm25_rank,
                    snippet(entries_fts, 0, '[', ']', '...', 10),
                    snippet(entries_fts, 1, '[', ']', '...', 10),
                    snippet(entries_fts, 2, '[', ']', '...', 10)
             FROM entries_fts
             JOIN entries e ON e.id = entries_fts.rowid
             WHERE e.deleted_at IS NULL AND entries_fts MATCH ?1
             ORDER BY bm25_rank ASC, e.id ASC
             LIMIT ?2 OFFSET ?3",
            prefixed_entry_columns("e")
        ))?;
        let rows = stmt
            .query_map(params![query, limit as i64, offset as i64], |row| {
                let snippets: [Option<String>; 3] = [row.get(9)?, row.get(10)?, row.get(11)?];
                // the first field with a highlighted term
                let snippet = snippets
                    .into_iter()
                    .flatten()
                    .find(|s| s.contains('['));
                Ok((RawEntry::from_row(row, 0)?, row.get::<_, Option<f64>>(8)?, snippet))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(raw, rank, snippet)| {
                Ok(FtsHit {
                    entry: raw.into_entry()?,
                    rank: rank.unwrap_or(0.0),
                    snippet,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fts_query;
    use crate::store::Store;
    use crate::vocab::{EntryUpdate, Language, NewEntry};

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("high-level  OR x"), "\"high-level\" \"OR\" \"x\"");
        assert_eq!(fts_query("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
        assert_eq!(fts_query("   "), "");
    }

    #[test]
    fn test_substring_is_case_sensitive() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_entry(&NewEntry::new(Language::En, "Resilience").with_notes("bounce back"))
            .unwrap();

        assert_eq!(store.substring_entries("Resil", 10, 0).unwrap().len(), 1);
        assert_eq!(store.substring_entries("bounce", 10, 0).unwrap().len(), 1);
        assert!(store.substring_entries("resil", 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_fts_tracks_updates_and_deletes() {
        let store = Store::open_in_memory().unwrap();
        let e = store
            .add_entry(&NewEntry::new(Language::En, "sturdy").with_notes("strong and solid"))
            .unwrap();
        store.add_entry(&NewEntry::new(Language::En, "fragile")).unwrap();

        let hits = store.fts_entries("solid", 10, 0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.id, e.id);

        let update = EntryUpdate {
            notes: Some("robust".to_string()),
            ..Default::default()
        };
        store.update_entry(e.id, &update).unwrap();
        assert!(store.fts_entries("solid", 10, 0).unwrap().is_empty());
        assert_eq!(store.fts_entries("robust", 10, 0).unwrap().len(), 1);

        store.soft_delete_entry(e.id).unwrap();
        assert!(store.fts_entries("robust", 10, 0).unwrap().is_empty());
    }
}

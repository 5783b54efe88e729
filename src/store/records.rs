use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};

use super::encode::{clean_text, now, RawLink, RawRecord, LINK_COLUMNS, RECORD_COLUMNS};
use super::{Result, Store, StoreError};
use crate::vocab::{NewLink, QueueOp, Record, RecordLink};

impl Store {
    pub fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                params![id],
                RawRecord::from_row,
            )
            .optional()?;

        raw.map(RawRecord::into_record).transpose()
    }

    /// Most recently updated first.
    pub fn list_records(&self, limit: usize, offset: usize) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM records
             ORDER BY updated_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let raws = stmt
            .query_map(params![limit as i64, offset as i64], RawRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raws.into_iter().map(RawRecord::into_record).collect()
    }

    fn write_links_in(conn: &Connection, record_id: i64, links: &[NewLink]) -> Result<()> {
        let ts = now();
        conn.execute(
            "DELETE FROM record_links WHERE record_id = ?1",
            params![record_id],
        )?;

        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO record_links
             (record_id, entry_id, start, \"end\", surface, match_type, score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for link in links {
            stmt.execute(params![
                record_id,
                link.entry_id,
                link.start as i64,
                link.end as i64,
                clean_text(&link.surface),
                link.match_type.as_str(),
                link.score as f64,
                ts,
            ])?;
        }
        Ok(())
    }

    /// One upsert per distinct linked entry.
    fn enqueue_links_in(conn: &Connection, links: &[NewLink], reason: &str) -> Result<()> {
        let linked: BTreeSet<i64> = links.iter().map(|l| l.entry_id).collect();
        for entry_id in linked {
            Self::enqueue_in(conn, entry_id, QueueOp::Upsert, reason)?;
        }
        Ok(())
    }

    /// Replace every link of `record_id` with `links`. When two links share a
    /// span, the later one wins.
    pub fn replace_record_links(&self, record_id: i64, links: &[NewLink]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        Self::write_links_in(&tx, record_id, links)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a record with its links and queue the linked entries, all or
    /// nothing.
    pub fn add_linked_record(&self, text: &str, links: &[NewLink], reason: &str) -> Result<Record> {
        let ts = now();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO records (text, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![clean_text(text), ts],
        )?;
        let id = tx.last_insert_rowid();
        Self::write_links_in(&tx, id, links)?;
        Self::enqueue_links_in(&tx, links, reason)?;
        tx.commit()?;

        self.get_record(id)?
            .ok_or_else(|| StoreError::Decode(format!("record {id} vanished after write")))
    }

    /// Replace the text and links of a record and queue the linked entries,
    /// all or nothing. Returns false when the record does not exist.
    pub fn update_linked_record(
        &self,
        id: i64,
        text: &str,
        links: &[NewLink],
        reason: &str,
    ) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE records SET text = ?1, updated_at = ?2 WHERE id = ?3",
            params![clean_text(text), now(), id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        Self::write_links_in(&tx, id, links)?;
        Self::enqueue_links_in(&tx, links, reason)?;
        tx.commit()?;
        Ok(true)
    }

    /// Links of `record_id` ordered by span start.
    pub fn fetch_record_links(&self, record_id: i64) -> Result<Vec<RecordLink>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM record_links
             WHERE record_id = ?1 ORDER BY start, \"end\""
        ))?;
        let raws = stmt
            .query_map(params![record_id], RawLink::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raws.into_iter().map(RawLink::into_link).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::store::Store;
    use crate::vocab::{Language, MatchType, NewEntry, NewLink};

    fn link(entry_id: i64, start: usize, end: usize) -> NewLink {
        NewLink {
            entry_id,
            start,
            end,
            surface: String::new(),
            match_type: MatchType::Manual,
            score: 1.0,
        }
    }

    #[test]
    fn test_replace_links_later_span_wins() {
        let store = Store::open_in_memory().unwrap();
        let x = store.add_entry(&NewEntry::new(Language::En, "x")).unwrap();
        let y = store.add_entry(&NewEntry::new(Language::En, "y")).unwrap();
        let record = store.add_linked_record("x marks y", &[], "test").unwrap();

        store
            .replace_record_links(record.id, &[link(x.id, 0, 1), link(y.id, 0, 1), link(y.id, 8, 9)])
            .unwrap();

        let links = store.fetch_record_links(record.id).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].entry_id, y.id);
        assert_eq!((links[1].start, links[1].end), (8, 9));

        store.replace_record_links(record.id, &[]).unwrap();
        assert!(store.fetch_record_links(record.id).unwrap().is_empty());
    }

    #[test]
    fn test_linked_record_writes_together() {
        let store = Store::open_in_memory().unwrap();
        let x = store.add_entry(&NewEntry::new(Language::En, "x")).unwrap();
        let queued = store.count_queue().unwrap();

        let record = store
            .add_linked_record("x and x", &[link(x.id, 0, 1), link(x.id, 6, 7)], "test")
            .unwrap();
        assert_eq!(store.fetch_record_links(record.id).unwrap().len(), 2);
        assert_eq!(store.count_queue().unwrap(), queued + 1);

        assert!(store.update_linked_record(record.id, "y", &[], "test").unwrap());
        assert!(store.fetch_record_links(record.id).unwrap().is_empty());
        assert!(!store.update_linked_record(record.id + 100, "y", &[], "test").unwrap());
        assert_eq!(store.get_record(record.id).unwrap().unwrap().text, "y");
        assert_eq!(store.list_records(10, 0).unwrap().len(), 1);
    }
}

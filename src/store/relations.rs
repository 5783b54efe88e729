use rusqlite::params;

use super::encode::{clean_text, now, RawRelation, RELATION_COLUMNS};
use super::{Result, Store};
use crate::vocab::Relation;

impl Store {
    /// Insert the `(from, to, type)` edge, or refresh its timestamp if it
    /// already exists. Returns the relation id.
    pub fn upsert_relation(&self, from_id: i64, to_id: i64, rel_type: &str) -> Result<i64> {
        let id = self.conn.query_row(
            "INSERT INTO relations (from_id, to_id, type, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(from_id, to_id, type) DO UPDATE SET created_at = excluded.created_at
             RETURNING id",
            params![from_id, to_id, clean_text(rel_type.trim()), now()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Relations touching `entry_id` at either end, newest first.
    pub fn list_relations(&self, entry_id: i64) -> Result<Vec<Relation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RELATION_COLUMNS} FROM relations
             WHERE from_id = ?1 OR to_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let raws = stmt
            .query_map(params![entry_id], RawRelation::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raws.into_iter().map(RawRelation::into_relation).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::store::Store;
    use crate::vocab::{Language, NewEntry, REL_SYNONYM, REL_TRANSLATION};

    #[test]
    fn test_upsert_is_unique_per_triple() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_entry(&NewEntry::new(Language::En, "big")).unwrap();
        let b = store.add_entry(&NewEntry::new(Language::En, "large")).unwrap();

        let first = store.upsert_relation(a.id, b.id, REL_SYNONYM).unwrap();
        let again = store.upsert_relation(a.id, b.id, REL_SYNONYM).unwrap();
        assert_eq!(first, again);

        let other = store.upsert_relation(a.id, b.id, REL_TRANSLATION).unwrap();
        assert_ne!(first, other);

        // reversed direction is a distinct row
        store.upsert_relation(b.id, a.id, REL_SYNONYM).unwrap();

        assert_eq!(store.list_relations(a.id).unwrap().len(), 3);
        assert_eq!(store.list_relations(b.id).unwrap().len(), 3);
    }
}

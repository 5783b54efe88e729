use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::encode::{decode_dt, now, pack_vector, unpack_vector};
use super::{Result, Store};

/// A persisted embedding row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub entry_id: i64,
    pub model: String,
    pub vector: Vec<f32>,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
}

struct RawEmbedding {
    entry_id: i64,
    model: String,
    dim: i64,
    vec: Vec<u8>,
    content_hash: String,
    updated_at: String,
}

impl RawEmbedding {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawEmbedding {
            entry_id: row.get(0)?,
            model: row.get(1)?,
            dim: row.get(2)?,
            vec: row.get(3)?,
            content_hash: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_embedding(self) -> Result<StoredEmbedding> {
        Ok(StoredEmbedding {
            entry_id: self.entry_id,
            vector: unpack_vector(&self.vec, self.dim.max(0) as usize)?,
            model: self.model,
            content_hash: self.content_hash,
            updated_at: decode_dt(&self.updated_at)?,
        })
    }
}

impl Store {
    /// Insert or overwrite the embedding of `entry_id` under `model`.
    pub fn upsert_embedding(
        &self,
        entry_id: i64,
        model: &str,
        vector: &[f32],
        content_hash: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO entry_embeddings (entry_id, model, dim, vec, content_hash, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(entry_id, model) DO UPDATE SET
                dim = excluded.dim,
                vec = excluded.vec,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at",
            params![
                entry_id,
                model,
                vector.len() as i64,
                pack_vector(vector),
                content_hash,
                now()
            ],
        )?;
        Ok(())
    }

    pub fn get_embedding(&self, entry_id: i64, model: &str) -> Result<Option<StoredEmbedding>> {
        let raw = self
            .conn
            .query_row(
                "SELECT entry_id, model, dim, vec, content_hash, updated_at
                 FROM entry_embeddings WHERE entry_id = ?1 AND model = ?2",
                params![entry_id, model],
                RawEmbedding::from_row,
            )
            .optional()?;

        raw.map(RawEmbedding::into_embedding).transpose()
    }

    /// Embeddings of live entries for `model`, in entry id order. Rows whose
    /// blob does not match their declared dimension are skipped.
    pub fn live_embeddings(&self, model: &str) -> Result<Vec<StoredEmbedding>> {
        let mut stmt = self.conn.prepare(
            "SELECT emb.entry_id, emb.model, emb.dim, emb.vec, emb.content_hash, emb.updated_at
             FROM entry_embeddings emb
             JOIN entries e ON e.id = emb.entry_id
             WHERE emb.model = ?1 AND e.deleted_at IS NULL
             ORDER BY emb.entry_id",
        )?;
        let raws = stmt
            .query_map(params![model], RawEmbedding::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut embeddings = Vec::with_capacity(raws.len());
        for raw in raws {
            let entry_id = raw.entry_id;
            match raw.into_embedding() {
                Ok(embedding) => embeddings.push(embedding),
                Err(err) => log::warn!("skipping embedding entry_id={entry_id}: {err}"),
            }
        }
        Ok(embeddings)
    }

    pub fn count_embeddings(&self, model: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entry_embeddings WHERE model = ?1",
            params![model],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

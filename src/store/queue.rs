use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::encode::{decode_dt, now, RawQueueItem, QUEUE_COLUMNS};
use super::{Result, Store};
use crate::vocab::{QueueItem, QueueOp};

/// Ledger row describing the last completed index rebuild for a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnBuild {
    pub model: String,
    pub dim: usize,
    pub count: usize,
    pub built_at: DateTime<Utc>,
}

impl Store {
    pub(super) fn enqueue_in(
        conn: &Connection,
        entry_id: i64,
        op: QueueOp,
        reason: &str,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO ann_queue (entry_id, op, queued_at, reason) VALUES (?1, ?2, ?3, ?4)",
            params![entry_id, op.as_str(), now(), reason],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Append a change notification for the ANN maintenance path.
    pub fn enqueue(&self, entry_id: i64, op: QueueOp, reason: &str) -> Result<i64> {
        Self::enqueue_in(&self.conn, entry_id, op, reason)
    }

    /// Oldest `max_n` queue items.
    pub fn fetch_queue(&self, max_n: usize) -> Result<Vec<QueueItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUEUE_COLUMNS} FROM ann_queue ORDER BY id LIMIT ?1"
        ))?;
        let raws = stmt
            .query_map(params![max_n as i64], RawQueueItem::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raws.into_iter().map(RawQueueItem::into_item).collect()
    }

    pub fn clear_queue(&self, ids: &[i64]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = Self::clear_queue_in(&tx, ids)?;
        tx.commit()?;
        Ok(removed)
    }

    fn clear_queue_in(conn: &Connection, ids: &[i64]) -> Result<usize> {
        let mut stmt = conn.prepare("DELETE FROM ann_queue WHERE id = ?1")?;
        let mut removed = 0;
        for id in ids {
            removed += stmt.execute(params![id])?;
        }
        Ok(removed)
    }

    pub fn count_queue(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ann_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Record a completed rebuild and clear the queue items it incorporated,
    /// in one transaction.
    pub fn finish_ann_rebuild(
        &self,
        model: &str,
        dim: usize,
        count: usize,
        drained_ids: &[i64],
    ) -> Result<AnnBuild> {
        let tx = self.conn.unchecked_transaction()?;
        Self::clear_queue_in(&tx, drained_ids)?;
        tx.execute(
            "INSERT INTO ann_builds (model, dim, count, built_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(model) DO UPDATE SET
                dim = excluded.dim, count = excluded.count, built_at = excluded.built_at",
            params![model, dim as i64, count as i64, now()],
        )?;
        tx.commit()?;

        self.last_ann_build(model)?.ok_or_else(|| {
            super::StoreError::Decode(format!("ann build for {model} vanished after write"))
        })
    }

    pub fn last_ann_build(&self, model: &str) -> Result<Option<AnnBuild>> {
        let raw: Option<(String, i64, i64, String)> = self
            .conn
            .query_row(
                "SELECT model, dim, count, built_at FROM ann_builds WHERE model = ?1",
                params![model],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        raw.map(|(model, dim, count, built_at)| {
            Ok(AnnBuild {
                model,
                dim: dim as usize,
                count: count as usize,
                built_at: decode_dt(&built_at)?,
            })
        })
        .transpose()
    }
}

//! SQLite row store for entries, relations, records and the derived
//! embedding/ANN bookkeeping tables.
//!
//! Every public method is its own transaction; nothing holds a transaction
//! open across calls. Timestamps are stored as fixed-width RFC 3339 strings
//! (microsecond precision, `Z` suffix) so they order lexicographically.

mod embeddings;
mod encode;
mod entries;
mod query;
mod queue;
mod records;
mod relations;
mod schema;

use std::path::Path;

use rusqlite::Connection;

pub use embeddings::StoredEmbedding;
pub use query::FtsHit;
pub use queue::AnnBuild;
pub use schema::SCHEMA_VERSION;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    #[error("corrupt row: {0}")]
    Decode(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Handle to the notebook database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and bring its schema up to
    /// date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        log::info!(
            "opened database path={} schema_version={}",
            path.display(),
            store.schema_version()?
        );
        Ok(store)
    }

    /// Open an in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(schema::PRAGMAS)?;
        schema::migrate(&self.conn)
    }

    pub fn schema_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }
}

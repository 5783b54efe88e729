//! Schema migrations, gated on `PRAGMA user_version`.
//!
//! Each step runs in its own transaction together with the version bump, so
//! an interrupted upgrade resumes from the last completed step.

use rusqlite::Connection;

use super::Result;

pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

const MIGRATIONS: &[&str] = &[
    // 1: vocabulary entries and typed relations between them
    "
    CREATE TABLE IF NOT EXISTS entries (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        language    TEXT NOT NULL,          -- 'en' | 'zh'
        word        TEXT NOT NULL,
        translation TEXT,
        notes       TEXT,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT                    -- NULL while live
    );

    CREATE TABLE IF NOT EXISTS relations (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        from_id    INTEGER NOT NULL REFERENCES entries(id),
        to_id      INTEGER NOT NULL REFERENCES entries(id),
        type       TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS relations_uniq_idx ON relations(from_id, to_id, type);
    CREATE INDEX IF NOT EXISTS relations_to_idx ON relations(to_id);
    ",
    // 2: free-text records and their span annotations
    "
    CREATE TABLE IF NOT EXISTS records (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        text       TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS record_links (
        record_id  INTEGER NOT NULL REFERENCES records(id),
        entry_id   INTEGER NOT NULL REFERENCES entries(id),
        start      INTEGER NOT NULL,
        \"end\"      INTEGER NOT NULL,
        surface    TEXT NOT NULL DEFAULT '',
        match_type TEXT NOT NULL,
        score      REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        CHECK (start >= 0 AND start < \"end\")
    );

    CREATE UNIQUE INDEX IF NOT EXISTS record_links_span_idx ON record_links(record_id, start, \"end\");
    CREATE INDEX IF NOT EXISTS record_links_entry_idx ON record_links(entry_id);
    ",
    // 3: full-text index over entry text, kept in sync by triggers
    "
    CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
        word, translation, notes, content='entries', content_rowid='id'
    );

    INSERT INTO entries_fts(entries_fts) VALUES('rebuild');

    CREATE TRIGGER IF NOT EXISTS entries_fts_ai AFTER INSERT ON entries BEGIN
        INSERT INTO entries_fts(rowid, word, translation, notes)
        VALUES (new.id, new.word, new.translation, new.notes);
    END;

    CREATE TRIGGER IF NOT EXISTS entries_fts_ad AFTER DELETE ON entries BEGIN
        INSERT INTO entries_fts(entries_fts, rowid, word, translation, notes)
        VALUES ('delete', old.id, old.word, old.translation, old.notes);
    END;

    CREATE TRIGGER IF NOT EXISTS entries_fts_au AFTER UPDATE ON entries BEGIN
        INSERT INTO entries_fts(entries_fts, rowid, word, translation, notes)
        VALUES ('delete', old.id, old.word, old.translation, old.notes);
        INSERT INTO entries_fts(rowid, word, translation, notes)
        VALUES (new.id, new.word, new.translation, new.notes);
    END;
    ",
    // 4: per-entry, per-model embeddings (derived data)
    "
    CREATE TABLE IF NOT EXISTS entry_embeddings (
        entry_id     INTEGER NOT NULL REFERENCES entries(id),
        model        TEXT NOT NULL,
        dim          INTEGER NOT NULL,
        vec          BLOB NOT NULL,       -- little-endian f32 x dim
        content_hash TEXT NOT NULL,
        updated_at   TEXT NOT NULL,
        PRIMARY KEY (entry_id, model)
    );
    ",
    // 5: change log consumed by the ANN maintenance path
    "
    CREATE TABLE IF NOT EXISTS ann_queue (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        entry_id  INTEGER NOT NULL,
        op        TEXT NOT NULL,          -- 'upsert' | 'delete'
        queued_at TEXT NOT NULL,
        reason    TEXT NOT NULL DEFAULT ''
    );
    ",
    // 6: ledger of completed index rebuilds, one row per model
    "
    CREATE TABLE IF NOT EXISTS ann_builds (
        model    TEXT PRIMARY KEY,
        dim      INTEGER NOT NULL,
        count    INTEGER NOT NULL,
        built_at TEXT NOT NULL
    );
    ",
    // 7: read-path indexes
    "
    CREATE INDEX IF NOT EXISTS entries_updated_idx ON entries(updated_at);
    CREATE INDEX IF NOT EXISTS entries_language_idx ON entries(language) WHERE deleted_at IS NULL;
    CREATE INDEX IF NOT EXISTS records_updated_idx ON records(updated_at);
    ",
];

pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

pub fn migrate(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = idx as i64 + 1;
        if version <= current {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {version};"))?;
        tx.commit()?;
        log::info!("applied schema migration version={version}");
    }

    Ok(())
}

use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS bases (
    base_id BLOB PRIMARY KEY CHECK (length(base_id) = 16),
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tables (
    table_id BLOB PRIMARY KEY CHECK (length(table_id) = 16),
    base_id BLOB NOT NULL REFERENCES bases (base_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    is_master_list INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_tables_base ON tables (base_id, position);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tables_one_master ON tables (base_id) WHERE is_master_list = 1;

CREATE TABLE IF NOT EXISTS fields (
    field_id BLOB PRIMARY KEY CHECK (length(field_id) = 16),
    table_id BLOB NOT NULL REFERENCES tables (table_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    field_type TEXT NOT NULL,
    position INTEGER NOT NULL,
    options TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_fields_table ON fields (table_id, position);

CREATE TABLE IF NOT EXISTS records (
    rowid INTEGER PRIMARY KEY,
    table_id BLOB NOT NULL REFERENCES tables (table_id) ON DELETE CASCADE,
    record_id BLOB NOT NULL CHECK (length(record_id) = 16),
    values_json TEXT NOT NULL DEFAULT '{}',
    UNIQUE (table_id, record_id)
);
CREATE INDEX IF NOT EXISTS idx_records_source
    ON records (table_id, json_extract(values_json, '$._source_record_id'));

CREATE TABLE IF NOT EXISTS automations (
    rowid INTEGER PRIMARY KEY,
    automation_id BLOB NOT NULL UNIQUE CHECK (length(automation_id) = 16),
    base_id BLOB NOT NULL REFERENCES bases (base_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    trigger_def BLOB,
    action_def BLOB
);
CREATE INDEX IF NOT EXISTS idx_automations_base ON automations (base_id, rowid);
";

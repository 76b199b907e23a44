//! SQL schema for the late-day cache.
//!
//! Executed once at connection startup. `late_day_cache.id` doubles as the
//! slot epoch: `AUTOINCREMENT` guarantees a deleted row's id is never handed
//! out again, so a ticket can only ever match the row it was issued for.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per reserved or populated (gradeable, student) pair.
-- The value columns are all NULL while a row is reserved or cleared.
CREATE TABLE IF NOT EXISTS late_day_cache (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    g_id                TEXT    NOT NULL,
    user_id             TEXT    NOT NULL,
    late_day_status     INTEGER,
    late_days_remaining INTEGER,
    days_late           INTEGER,
    days_allowed        INTEGER,
    days_charged        INTEGER,
    UNIQUE (g_id, user_id)
);

-- Deleted gradeables. No row of late_day_cache may be created for these.
CREATE TABLE IF NOT EXISTS late_day_cache_removed (
    g_id TEXT PRIMARY KEY
);

CREATE INDEX IF NOT EXISTS late_day_cache_user_idx ON late_day_cache(user_id);

PRAGMA user_version = 1;
";

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// One entry per schema revision, applied in order inside a single
/// transaction. Each statement batch must be safe to skip once its
/// `schema_version` row exists, so re-running migrations is a checkable
/// no-op rather than relying on `CREATE TABLE IF NOT EXISTS` idempotency
/// alone.
const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_1)];

const MIGRATION_1: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id      INTEGER PRIMARY KEY NOT NULL,
    display_name TEXT NOT NULL,
    is_allowed   INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_settings (
    user_id    INTEGER PRIMARY KEY NOT NULL REFERENCES users(user_id),
    timezone   TEXT NOT NULL DEFAULT 'UTC',
    language   TEXT NOT NULL DEFAULT 'en',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memories (
    id                 TEXT PRIMARY KEY NOT NULL,
    owner_user_id      INTEGER NOT NULL REFERENCES users(user_id),
    source_chat_id     INTEGER,
    source_message_id  INTEGER,
    content            TEXT,
    media_type         TEXT,
    media_file_id      TEXT,
    media_local_path   TEXT,
    status             TEXT NOT NULL DEFAULT 'confirmed',
    pending_expires_at TEXT,
    is_pinned          INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_owner ON memories(owner_user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_memories_pending ON memories(status, pending_expires_at);

CREATE TABLE IF NOT EXISTS memory_tags (
    memory_id     TEXT NOT NULL REFERENCES memories(id),
    tag           TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'confirmed',
    suggested_at  TEXT,
    confirmed_at  TEXT,
    PRIMARY KEY (memory_id, tag)
);
CREATE INDEX IF NOT EXISTS idx_tags_suggested ON memory_tags(status, suggested_at);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts
    USING fts5(content, tags, content='');

CREATE TABLE IF NOT EXISTS memories_fts_meta (
    memory_id TEXT PRIMARY KEY NOT NULL,
    rowid_ref INTEGER NOT NULL,
    content   TEXT NOT NULL DEFAULT '',
    tags      TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS tasks (
    id                 TEXT PRIMARY KEY NOT NULL,
    memory_id          TEXT NOT NULL REFERENCES memories(id),
    owner_user_id      INTEGER NOT NULL REFERENCES users(user_id),
    description        TEXT NOT NULL,
    state              TEXT NOT NULL DEFAULT 'NOT_DONE',
    due_at             TEXT,
    recurrence_minutes INTEGER,
    completed_at       TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner_user_id, state);
CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(state, due_at);

CREATE TABLE IF NOT EXISTS reminders (
    id                 TEXT PRIMARY KEY NOT NULL,
    memory_id          TEXT REFERENCES memories(id),
    owner_user_id      INTEGER NOT NULL REFERENCES users(user_id),
    fire_at            TEXT NOT NULL,
    recurrence_minutes INTEGER,
    fired              INTEGER NOT NULL DEFAULT 0,
    text               TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(fired, fire_at);

CREATE TABLE IF NOT EXISTS events (
    id             TEXT PRIMARY KEY NOT NULL,
    memory_id      TEXT REFERENCES memories(id),
    owner_user_id  INTEGER NOT NULL REFERENCES users(user_id),
    description    TEXT NOT NULL,
    event_time     TEXT NOT NULL,
    source_type    TEXT NOT NULL,
    source_detail  TEXT,
    status         TEXT NOT NULL DEFAULT 'pending',
    pending_since  TEXT,
    reminder_id    TEXT REFERENCES reminders(id),
    confirmed_at   TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_pending ON events(status, pending_since);

CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id   TEXT NOT NULL,
    action      TEXT NOT NULL,
    actor       TEXT NOT NULL,
    detail      TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);

CREATE TABLE IF NOT EXISTS llm_jobs (
    id            TEXT PRIMARY KEY NOT NULL,
    job_type      TEXT NOT NULL,
    payload       TEXT NOT NULL,
    user_id       INTEGER,
    status        TEXT NOT NULL DEFAULT 'queued',
    result        TEXT,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON llm_jobs(status);
";

/// Apply all migrations newer than the current `schema_version`, in one
/// transaction. Safe to call on every startup.
pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
        .unwrap_or(0);

    let tx = conn.transaction()?;
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("migration {version} failed: {e}")))?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            rusqlite::params![version],
        )?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_migrations_twice_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        let version_count_before: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();

        run(&mut conn).unwrap();
        let version_count_after: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();

        assert_eq!(version_count_before, version_count_after);
        assert_eq!(version_count_before, MIGRATIONS.len() as i64);
    }

    #[test]
    fn core_tables_exist_after_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        for table in ["users", "memories", "memory_tags", "memories_fts", "tasks", "reminders", "events", "audit_log", "llm_jobs"] {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table','view') AND name = ?1",
                    rusqlite::params![table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "missing table {table}");
        }
    }
}

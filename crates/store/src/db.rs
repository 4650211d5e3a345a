use rusqlite::Connection;

use crate::error::Result;
use crate::migrations;

/// Open (creating if absent) the database file, enable WAL + foreign keys,
/// and run migrations.
pub fn open(path: &str) -> Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    migrations::run(&mut conn)?;
    Ok(conn)
}

/// In-memory database, for this crate's tests and for other crates that
/// need a throwaway store in theirs. Foreign keys still enforced; no WAL
/// since there's no file to share across processes.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations::run(&mut conn)?;
    Ok(conn)
}

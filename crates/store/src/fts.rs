use rusqlite::{params, Connection};

use crate::error::Result;

/// Row shape for `memories_fts_meta`, the side cache that remembers the
/// exact last-indexed `(content, tags)` strings for a memory so deletes
/// against the contentless FTS5 table can be issued with matching values.
/// Memory ids aren't usable as FTS5 rowids, so this table also tracks its
/// own integer rowid counter alongside the string id.
struct FtsMeta {
    rowid_ref: i64,
    content: String,
    tags: String,
}

fn load_meta(conn: &Connection, memory_id: &str) -> Result<Option<FtsMeta>> {
    let row = conn
        .query_row(
            "SELECT rowid_ref, content, tags FROM memories_fts_meta WHERE memory_id = ?1",
            params![memory_id],
            |r| {
                Ok(FtsMeta {
                    rowid_ref: r.get(0)?,
                    content: r.get(1)?,
                    tags: r.get(2)?,
                })
            },
        )
        .ok();
    Ok(row)
}

/// Remove a memory's entry from the FTS index, if present. Idempotent.
fn delete(conn: &Connection, memory_id: &str) -> Result<()> {
    if let Some(meta) = load_meta(conn, memory_id)? {
        conn.execute(
            "INSERT INTO memories_fts(memories_fts, rowid, content, tags) VALUES('delete', ?1, ?2, ?3)",
            params![meta.rowid_ref, meta.content, meta.tags],
        )?;
        conn.execute(
            "DELETE FROM memories_fts_meta WHERE memory_id = ?1",
            params![memory_id],
        )?;
    }
    Ok(())
}

/// Insert or replace a memory's FTS entry with fresh `content`/`tags` text.
/// Call only for memories in `status = 'confirmed'`.
pub fn index(conn: &Connection, memory_id: &str, content: &str, tags: &str) -> Result<()> {
    delete(conn, memory_id)?;
    conn.execute(
        "INSERT INTO memories_fts(content, tags) VALUES (?1, ?2)",
        params![content, tags],
    )?;
    let rowid_ref = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO memories_fts_meta (memory_id, rowid_ref, content, tags)
         VALUES (?1, ?2, ?3, ?4)",
        params![memory_id, rowid_ref, content, tags],
    )?;
    Ok(())
}

/// Remove a memory from the FTS index entirely (memory deleted, or
/// transitioned away from `confirmed`).
pub fn remove(conn: &Connection, memory_id: &str) -> Result<()> {
    delete(conn, memory_id)
}

/// Build the concatenated tags string FTS indexes: confirmed tags only,
/// space-joined.
pub fn confirmed_tags_string(conn: &Connection, memory_id: &str) -> Result<String> {
    let mut stmt = conn.prepare(
        "SELECT tag FROM memory_tags WHERE memory_id = ?1 AND status = 'confirmed' ORDER BY tag",
    )?;
    let tags: Vec<String> = stmt
        .query_map(params![memory_id], |r| r.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(tags.join(" "))
}

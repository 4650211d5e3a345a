use rusqlite::{params, Connection, OptionalExtension};

use bearmemori_core::{now_iso, Actor, EntityId};

use crate::error::{Result, StoreError};
use crate::types::{Memory, MemoryTag};

const PENDING_IMAGE_TTL_DAYS: i64 = 7;

pub struct NewMemory<'a> {
    pub owner_user_id: i64,
    pub source_chat_id: Option<i64>,
    pub source_message_id: Option<i64>,
    pub content: Option<&'a str>,
    pub media_type: Option<&'a str>,
    pub media_file_id: Option<&'a str>,
    pub media_local_path: Option<&'a str>,
}

/// Insert a memory. Images start `pending` with a 7-day expiry; anything
/// else (text) starts `confirmed` and is indexed immediately.
pub fn create(conn: &mut Connection, actor: &Actor, new: NewMemory<'_>) -> Result<Memory> {
    crate::users::ensure_allowed(conn, actor)?;
    let id = EntityId::new().to_string();
    let now = now_iso();
    let is_image = new.media_type == Some("image");
    let status = if is_image { "pending" } else { "confirmed" };
    let pending_expires_at = if is_image {
        Some(
            (chrono::Utc::now() + chrono::Duration::days(PENDING_IMAGE_TTL_DAYS))
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        )
    } else {
        None
    };

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO memories
         (id, owner_user_id, source_chat_id, source_message_id, content, media_type,
          media_file_id, media_local_path, status, pending_expires_at, is_pinned,
          created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?11)",
        params![
            id,
            new.owner_user_id,
            new.source_chat_id,
            new.source_message_id,
            new.content,
            new.media_type,
            new.media_file_id,
            new.media_local_path,
            status,
            pending_expires_at,
            now,
        ],
    )?;

    if !is_image {
        let content = new.content.unwrap_or_default();
        crate::fts::index(&tx, &id, content, "")?;
    }

    crate::audit::append(&tx, "memory", &id, "created", actor, None)?;
    tx.commit()?;

    get(conn, &id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id })
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    conn.query_row(
        "SELECT id, owner_user_id, source_chat_id, source_message_id, content, media_type,
                media_file_id, media_local_path, status, pending_expires_at, is_pinned,
                created_at, updated_at
         FROM memories WHERE id = ?1",
        params![id],
        row_to_memory,
    )
    .optional()
    .map_err(StoreError::from)
}

/// Any user interaction (view, tag, pin, comment) confirms a pending image
/// memory.
pub fn confirm(conn: &mut Connection, id: &str, actor: &Actor) -> Result<Memory> {
    crate::users::ensure_allowed(conn, actor)?;
    let mem = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })?;
    if mem.status == "confirmed" {
        return Ok(mem);
    }

    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE memories SET status = 'confirmed', pending_expires_at = NULL, updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    let tags = crate::fts::confirmed_tags_string(&tx, id)?;
    crate::fts::index(&tx, id, mem.content.as_deref().unwrap_or(""), &tags)?;
    crate::audit::append(&tx, "memory", id, "confirmed", actor, None)?;
    tx.commit()?;

    get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })
}

/// Set `content` when the worker fills in a description for a memory that
/// had none — the `image_tag` handler's caption-absent case.
pub fn set_content(conn: &mut Connection, id: &str, content: &str, actor: &Actor) -> Result<Memory> {
    crate::users::ensure_allowed(conn, actor)?;
    let mem = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })?;
    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute("UPDATE memories SET content = ?1, updated_at = ?2 WHERE id = ?3", params![content, now, id])?;
    if mem.status == "confirmed" {
        let tags = crate::fts::confirmed_tags_string(&tx, id)?;
        crate::fts::index(&tx, id, content, &tags)?;
    }
    crate::audit::append(&tx, "memory", id, "updated", actor, Some(&serde_json::json!({ "field": "content" })))?;
    tx.commit()?;
    get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })
}

/// Record the on-disk path for an image memory once the upload lands — the
/// row may already carry a `media_file_id` from the originating chat
/// platform with the bytes arriving moments later.
pub fn attach_image_file(conn: &mut Connection, id: &str, media_local_path: &str, actor: &Actor) -> Result<Memory> {
    crate::users::ensure_allowed(conn, actor)?;
    let _ = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })?;
    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE memories SET media_local_path = ?1, media_type = COALESCE(media_type, 'image'), updated_at = ?2
         WHERE id = ?3",
        params![media_local_path, now, id],
    )?;
    crate::audit::append(&tx, "memory", id, "updated", actor, Some(&serde_json::json!({ "field": "media_local_path" })))?;
    tx.commit()?;
    get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })
}

pub fn set_pinned(conn: &mut Connection, id: &str, pinned: bool, actor: &Actor) -> Result<Memory> {
    crate::users::ensure_allowed(conn, actor)?;
    let _ = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })?;
    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE memories SET is_pinned = ?1, updated_at = ?2 WHERE id = ?3",
        params![pinned as i64, now, id],
    )?;
    let detail = serde_json::json!({ "is_pinned": pinned });
    crate::audit::append(&tx, "memory", id, "updated", actor, Some(&detail))?;
    tx.commit()?;
    get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })
}

/// Re-read confirmed tags and rebuild the FTS row after a tag confirm or
/// remove on an already-confirmed memory.
fn reindex_if_confirmed(conn: &Connection, id: &str) -> Result<()> {
    let mem = get(conn, id)?;
    if let Some(mem) = mem {
        if mem.status == "confirmed" {
            let tags = crate::fts::confirmed_tags_string(conn, id)?;
            crate::fts::index(conn, id, mem.content.as_deref().unwrap_or(""), &tags)?;
        }
    }
    Ok(())
}

pub fn add_tag(conn: &mut Connection, memory_id: &str, tag: &str, confirmed: bool, actor: &Actor) -> Result<()> {
    crate::users::ensure_allowed(conn, actor)?;
    let now = now_iso();
    let status = if confirmed { "confirmed" } else { "suggested" };
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO memory_tags (memory_id, tag, status, suggested_at, confirmed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(memory_id, tag) DO UPDATE SET status = excluded.status,
            confirmed_at = excluded.confirmed_at",
        params![
            memory_id,
            tag,
            status,
            (!confirmed).then(|| now.clone()),
            confirmed.then(|| now.clone()),
        ],
    )?;
    if confirmed {
        reindex_if_confirmed(&tx, memory_id)?;
    }
    let action = if confirmed { "confirmed" } else { "created" };
    let detail = serde_json::json!({ "tag": tag });
    crate::audit::append(&tx, "memory_tag", memory_id, action, actor, Some(&detail))?;
    tx.commit()?;
    Ok(())
}

pub fn confirm_tag(conn: &mut Connection, memory_id: &str, tag: &str, actor: &Actor) -> Result<()> {
    crate::users::ensure_allowed(conn, actor)?;
    let now = now_iso();
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE memory_tags SET status = 'confirmed', confirmed_at = ?1 WHERE memory_id = ?2 AND tag = ?3",
        params![now, memory_id, tag],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound { entity: "memory_tag", id: format!("{memory_id}/{tag}") });
    }
    reindex_if_confirmed(&tx, memory_id)?;
    let detail = serde_json::json!({ "tag": tag });
    crate::audit::append(&tx, "memory_tag", memory_id, "confirmed", actor, Some(&detail))?;
    tx.commit()?;
    Ok(())
}

pub fn remove_tag(conn: &mut Connection, memory_id: &str, tag: &str, actor: &Actor) -> Result<()> {
    crate::users::ensure_allowed(conn, actor)?;
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "DELETE FROM memory_tags WHERE memory_id = ?1 AND tag = ?2",
        params![memory_id, tag],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound { entity: "memory_tag", id: format!("{memory_id}/{tag}") });
    }
    reindex_if_confirmed(&tx, memory_id)?;
    let detail = serde_json::json!({ "tag": tag });
    crate::audit::append(&tx, "memory_tag", memory_id, "deleted", actor, Some(&detail))?;
    tx.commit()?;
    Ok(())
}

pub fn list_tags(conn: &Connection, memory_id: &str) -> Result<Vec<MemoryTag>> {
    let mut stmt = conn.prepare(
        "SELECT memory_id, tag, status, suggested_at, confirmed_at FROM memory_tags
         WHERE memory_id = ?1 ORDER BY tag",
    )?;
    let rows = stmt.query_map(params![memory_id], |row| {
        Ok(MemoryTag {
            memory_id: row.get(0)?,
            tag: row.get(1)?,
            status: row.get(2)?,
            suggested_at: row.get(3)?,
            confirmed_at: row.get(4)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Hard-delete a memory and everything keyed to it. Returns the local media
/// path (if any) so the caller can best-effort unlink the backing file —
/// deletion of the row is never blocked on that filesystem operation (open
/// question (b), recorded in DESIGN.md).
pub fn delete(conn: &mut Connection, id: &str, actor: &Actor, reason: &str) -> Result<Option<String>> {
    crate::users::ensure_allowed(conn, actor)?;
    let mem = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "memory", id: id.to_string() })?;

    let tx = conn.transaction()?;
    crate::fts::remove(&tx, id)?;
    tx.execute("DELETE FROM memory_tags WHERE memory_id = ?1", params![id])?;
    tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    let action = if reason == "expired" { "expired" } else { "deleted" };
    let detail = serde_json::json!({ "reason": reason });
    crate::audit::append(&tx, "memory", id, action, actor, Some(&detail))?;
    tx.commit()?;

    Ok(mem.media_local_path)
}

/// Memories whose `pending_expires_at` has passed. Used by the housekeeping
/// scheduler.
pub fn list_expired_pending(conn: &Connection, now: &str) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_user_id, source_chat_id, source_message_id, content, media_type,
                media_file_id, media_local_path, status, pending_expires_at, is_pinned,
                created_at, updated_at
         FROM memories WHERE status = 'pending' AND pending_expires_at <= ?1",
    )?;
    let rows = stmt.query_map(params![now], row_to_memory)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_suggested_tags_older_than(conn: &Connection, cutoff: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT memory_id, tag FROM memory_tags WHERE status = 'suggested' AND suggested_at <= ?1",
    )?;
    let rows = stmt.query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn purge_suggested_tag(conn: &mut Connection, memory_id: &str, tag: &str) -> Result<()> {
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "DELETE FROM memory_tags WHERE memory_id = ?1 AND tag = ?2 AND status = 'suggested'",
        params![memory_id, tag],
    )?;
    if changed > 0 {
        let detail = serde_json::json!({ "tag": tag, "reason": "suggested_tag_ttl_expired" });
        crate::audit::append(&tx, "memory_tag", memory_id, "expired", &Actor::System, Some(&detail))?;
    }
    tx.commit()?;
    Ok(())
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    Ok(Memory {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        source_chat_id: row.get(2)?,
        source_message_id: row.get(3)?,
        content: row.get(4)?,
        media_type: row.get(5)?,
        media_file_id: row.get(6)?,
        media_local_path: row.get(7)?,
        status: row.get(8)?,
        pending_expires_at: row.get(9)?,
        is_pinned: row.get::<_, i64>(10)? != 0,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, users};

    fn setup() -> Connection {
        let mut conn = db::open_in_memory().unwrap();
        users::get_or_create(&mut conn, 1, "alice").unwrap();
        conn
    }

    #[test]
    fn text_memory_is_confirmed_with_no_expiry() {
        let mut conn = setup();
        let mem = create(&mut conn, &Actor::User(1), NewMemory {
            owner_user_id: 1,
            source_chat_id: None,
            source_message_id: None,
            content: Some("remember this"),
            media_type: None,
            media_file_id: None,
            media_local_path: None,
        }).unwrap();
        assert_eq!(mem.status, "confirmed");
        assert!(mem.pending_expires_at.is_none());
    }

    #[test]
    fn image_memory_is_pending_with_seven_day_expiry() {
        let mut conn = setup();
        let mem = create(&mut conn, &Actor::User(1), NewMemory {
            owner_user_id: 1,
            source_chat_id: None,
            source_message_id: None,
            content: None,
            media_type: Some("image"),
            media_file_id: Some("file123"),
            media_local_path: Some("/tmp/x.jpg"),
        }).unwrap();
        assert_eq!(mem.status, "pending");
        let expires = chrono::DateTime::parse_from_rfc3339(mem.pending_expires_at.as_ref().unwrap()).unwrap();
        let created = chrono::DateTime::parse_from_rfc3339(&mem.created_at).unwrap();
        assert_eq!((expires - created).num_days(), PENDING_IMAGE_TTL_DAYS);
    }

    #[test]
    fn confirming_pending_memory_indexes_it_and_clears_expiry() {
        let mut conn = setup();
        let mem = create(&mut conn, &Actor::User(1), NewMemory {
            owner_user_id: 1,
            source_chat_id: None,
            source_message_id: None,
            content: Some("a cat photo"),
            media_type: Some("image"),
            media_file_id: Some("f1"),
            media_local_path: None,
        }).unwrap();

        let confirmed = confirm(&mut conn, &mem.id, &Actor::User(1)).unwrap();
        assert_eq!(confirmed.status, "confirmed");
        assert!(confirmed.pending_expires_at.is_none());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories_fts_meta WHERE memory_id = ?1", params![mem.id], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn deleting_memory_removes_fts_meta_and_tags() {
        let mut conn = setup();
        let mem = create(&mut conn, &Actor::User(1), NewMemory {
            owner_user_id: 1,
            source_chat_id: None,
            source_message_id: None,
            content: Some("to be deleted"),
            media_type: None,
            media_file_id: None,
            media_local_path: None,
        }).unwrap();
        add_tag(&mut conn, &mem.id, "scratch", true, &Actor::User(1)).unwrap();

        delete(&mut conn, &mem.id, &Actor::User(1), "user_requested").unwrap();

        assert!(get(&conn, &mem.id).unwrap().is_none());
        let meta: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories_fts_meta WHERE memory_id = ?1", params![mem.id], |r| r.get(0))
            .unwrap();
        assert_eq!(meta, 0);
        let tags: i64 = conn
            .query_row("SELECT COUNT(*) FROM memory_tags WHERE memory_id = ?1", params![mem.id], |r| r.get(0))
            .unwrap();
        assert_eq!(tags, 0);
    }

    #[test]
    fn audit_log_records_every_transition() {
        let mut conn = setup();
        let mem = create(&mut conn, &Actor::User(1), NewMemory {
            owner_user_id: 1,
            source_chat_id: None,
            source_message_id: None,
            content: None,
            media_type: Some("image"),
            media_file_id: Some("f1"),
            media_local_path: None,
        }).unwrap();
        confirm(&mut conn, &mem.id, &Actor::User(1)).unwrap();
        set_pinned(&mut conn, &mem.id, true, &Actor::User(1)).unwrap();

        let log = crate::audit::list_for_entity(&conn, "memory", &mem.id).unwrap();
        let actions: Vec<&str> = log.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["created", "confirmed", "updated"]);
    }
}

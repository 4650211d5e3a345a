use rusqlite::{params, Connection};

use bearmemori_core::{now_iso, Actor};

use crate::error::Result;

/// Append one audit-log row inside the caller's transaction. `detail`, when
/// present, should preserve prior values on updates or the trigger reason
/// on expiries/requeues.
pub fn append(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    action: &str,
    actor: &Actor,
    detail: Option<&serde_json::Value>,
) -> Result<()> {
    let detail_str = detail.map(|v| v.to_string());
    conn.execute(
        "INSERT INTO audit_log (entity_type, entity_id, action, actor, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![entity_type, entity_id, action, actor.to_string(), detail_str, now_iso()],
    )?;
    Ok(())
}

pub fn list_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<crate::types::AuditLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, action, actor, detail, created_at
         FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![entity_type, entity_id], row_to_audit)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<crate::types::AuditLog> {
    Ok(crate::types::AuditLog {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        action: row.get(3)?,
        actor: row.get(4)?,
        detail: row.get(5)?,
        created_at: row.get(6)?,
    })
}

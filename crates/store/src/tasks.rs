use rusqlite::{params, Connection, OptionalExtension};

use bearmemori_core::{now_iso, Actor, EntityId};

use crate::error::{Result, StoreError};
use crate::types::Task;

pub struct NewTask<'a> {
    pub memory_id: &'a str,
    pub owner_user_id: i64,
    pub description: &'a str,
    pub due_at: Option<&'a str>,
    pub recurrence_minutes: Option<i64>,
}

pub fn create(conn: &mut Connection, actor: &Actor, new: NewTask<'_>) -> Result<Task> {
    crate::users::ensure_allowed(conn, actor)?;
    let id = EntityId::new().to_string();
    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO tasks (id, memory_id, owner_user_id, description, state, due_at,
         recurrence_minutes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'NOT_DONE', ?5, ?6, ?7, ?7)",
        params![id, new.memory_id, new.owner_user_id, new.description, new.due_at, new.recurrence_minutes, now],
    )?;
    crate::audit::append(&tx, "task", &id, "created", actor, None)?;
    tx.commit()?;
    get(conn, &id)?.ok_or_else(|| StoreError::NotFound { entity: "task", id })
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Task>> {
    conn.query_row(
        "SELECT id, memory_id, owner_user_id, description, state, due_at,
                recurrence_minutes, completed_at, created_at, updated_at
         FROM tasks WHERE id = ?1",
        params![id],
        row_to_task,
    )
    .optional()
    .map_err(StoreError::from)
}

/// Mark a task DONE. If it carries a `recurrence_minutes`, spawns the next
/// occurrence with `due_at = (previous due_at OR completed_at) + recurrence_minutes`
///.
pub fn complete(conn: &mut Connection, id: &str, actor: &Actor) -> Result<(Task, Option<Task>)> {
    crate::users::ensure_allowed(conn, actor)?;
    let task = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "task", id: id.to_string() })?;
    if task.state == "DONE" {
        return Ok((task, None));
    }

    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE tasks SET state = 'DONE', completed_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    crate::audit::append(&tx, "task", id, "updated", actor, Some(&serde_json::json!({ "state": "DONE" })))?;

    let next = if let Some(minutes) = task.recurrence_minutes {
        let base = task.due_at.as_deref().unwrap_or(&now);
        let base_dt = chrono::DateTime::parse_from_rfc3339(base)
            .map_err(|e| StoreError::Validation(format!("invalid due_at: {e}")))?;
        let next_due = (base_dt + chrono::Duration::minutes(minutes))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let next_id = EntityId::new().to_string();
        tx.execute(
            "INSERT INTO tasks (id, memory_id, owner_user_id, description, state, due_at,
             recurrence_minutes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'NOT_DONE', ?5, ?6, ?7, ?7)",
            params![next_id, task.memory_id, task.owner_user_id, task.description, next_due, minutes, now],
        )?;
        crate::audit::append(&tx, "task", &next_id, "created", &Actor::System,
            Some(&serde_json::json!({ "recurrence_of": id })))?;
        Some(next_id)
    } else {
        None
    };
    tx.commit()?;

    let updated = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "task", id: id.to_string() })?;
    let spawned = match next {
        Some(next_id) => get(conn, &next_id)?,
        None => None,
    };
    Ok((updated, spawned))
}

pub fn delete(conn: &mut Connection, id: &str, actor: &Actor) -> Result<()> {
    crate::users::ensure_allowed(conn, actor)?;
    let _ = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "task", id: id.to_string() })?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    crate::audit::append(&tx, "task", id, "deleted", actor, None)?;
    tx.commit()?;
    Ok(())
}

pub fn list_for_owner(conn: &Connection, owner_user_id: i64, state: Option<&str>) -> Result<Vec<Task>> {
    let sql = match state {
        Some(_) => "SELECT id, memory_id, owner_user_id, description, state, due_at,
                recurrence_minutes, completed_at, created_at, updated_at
             FROM tasks WHERE owner_user_id = ?1 AND state = ?2 ORDER BY due_at IS NULL, due_at ASC",
        None => "SELECT id, memory_id, owner_user_id, description, state, due_at,
                recurrence_minutes, completed_at, created_at, updated_at
             FROM tasks WHERE owner_user_id = ?1 ORDER BY due_at IS NULL, due_at ASC",
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = match state {
        Some(s) => stmt.query_map(params![owner_user_id, s], row_to_task)?,
        None => stmt.query_map(params![owner_user_id], row_to_task)?,
    };
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        owner_user_id: row.get(2)?,
        description: row.get(3)?,
        state: row.get(4)?,
        due_at: row.get(5)?,
        recurrence_minutes: row.get(6)?,
        completed_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, memories, users};

    fn setup() -> (Connection, String) {
        let mut conn = db::open_in_memory().unwrap();
        users::get_or_create(&mut conn, 1, "alice").unwrap();
        let mem = memories::create(&mut conn, &Actor::System, memories::NewMemory {
            owner_user_id: 1,
            source_chat_id: None,
            source_message_id: None,
            content: Some("buy milk"),
            media_type: None,
            media_file_id: None,
            media_local_path: None,
        }).unwrap();
        (conn, mem.id)
    }

    #[test]
    fn completing_non_recurring_task_spawns_nothing() {
        let (mut conn, memory_id) = setup();
        let task = create(&mut conn, &Actor::User(1), NewTask {
            memory_id: &memory_id,
            owner_user_id: 1,
            description: "buy milk",
            due_at: None,
            recurrence_minutes: None,
        }).unwrap();

        let (done, next) = complete(&mut conn, &task.id, &Actor::User(1)).unwrap();
        assert_eq!(done.state, "DONE");
        assert!(done.completed_at.is_some());
        assert!(next.is_none());
    }

    #[test]
    fn completing_recurring_task_spawns_next_occurrence() {
        let (mut conn, memory_id) = setup();
        let due = "2026-01-01T00:00:00.000Z";
        let task = create(&mut conn, &Actor::User(1), NewTask {
            memory_id: &memory_id,
            owner_user_id: 1,
            description: "water plants",
            due_at: Some(due),
            recurrence_minutes: Some(1440),
        }).unwrap();

        let (done, next) = complete(&mut conn, &task.id, &Actor::User(1)).unwrap();
        assert_eq!(done.state, "DONE");
        let next = next.expect("recurring task must spawn a successor");
        assert_eq!(next.state, "NOT_DONE");
        assert_eq!(next.due_at.as_deref(), Some("2026-01-02T00:00:00.000Z"));
        assert_eq!(next.recurrence_minutes, Some(1440));
    }
}

use rusqlite::{params, Connection, OptionalExtension};

use bearmemori_core::{now_iso, Actor, EntityId};

use crate::error::{Result, StoreError};
use crate::types::Reminder;

pub struct NewReminder<'a> {
    pub memory_id: Option<&'a str>,
    pub owner_user_id: i64,
    pub fire_at: &'a str,
    pub recurrence_minutes: Option<i64>,
    pub text: Option<&'a str>,
}

pub fn create(conn: &mut Connection, actor: &Actor, new: NewReminder<'_>) -> Result<Reminder> {
    crate::users::ensure_allowed(conn, actor)?;
    let id = EntityId::new().to_string();
    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO reminders (id, memory_id, owner_user_id, fire_at, recurrence_minutes,
         fired, text, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7)",
        params![id, new.memory_id, new.owner_user_id, new.fire_at, new.recurrence_minutes, new.text, now],
    )?;
    crate::audit::append(&tx, "reminder", &id, "created", actor, None)?;
    tx.commit()?;
    get(conn, &id)?.ok_or_else(|| StoreError::NotFound { entity: "reminder", id })
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Reminder>> {
    conn.query_row(
        "SELECT id, memory_id, owner_user_id, fire_at, recurrence_minutes, fired, text,
                created_at, updated_at
         FROM reminders WHERE id = ?1",
        params![id],
        row_to_reminder,
    )
    .optional()
    .map_err(StoreError::from)
}

/// Reminders due to fire (`fired = 0` and `fire_at <= now`), used by the
/// housekeeping scheduler.
pub fn list_due(conn: &Connection, now: &str) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(
        "SELECT id, memory_id, owner_user_id, fire_at, recurrence_minutes, fired, text,
                created_at, updated_at
         FROM reminders WHERE fired = 0 AND fire_at <= ?1",
    )?;
    let rows = stmt.query_map(params![now], row_to_reminder)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Mark a reminder fired. If recurring, inserts the next occurrence with
/// `fire_at = previous fire_at + recurrence_minutes`, `fired = false`
///.
pub fn mark_fired(conn: &mut Connection, id: &str) -> Result<Option<Reminder>> {
    let reminder = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "reminder", id: id.to_string() })?;
    let now = now_iso();

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE reminders SET fired = 1, updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    crate::audit::append(&tx, "reminder", id, "fired", &Actor::System, None)?;

    let next = if let Some(minutes) = reminder.recurrence_minutes {
        let base_dt = chrono::DateTime::parse_from_rfc3339(&reminder.fire_at)
            .map_err(|e| StoreError::Validation(format!("invalid fire_at: {e}")))?;
        let next_fire = (base_dt + chrono::Duration::minutes(minutes))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let next_id = EntityId::new().to_string();
        tx.execute(
            "INSERT INTO reminders (id, memory_id, owner_user_id, fire_at, recurrence_minutes,
             fired, text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7)",
            params![next_id, reminder.memory_id, reminder.owner_user_id, next_fire, minutes, reminder.text, now],
        )?;
        crate::audit::append(&tx, "reminder", &next_id, "created", &Actor::System,
            Some(&serde_json::json!({ "recurrence_of": id })))?;
        Some(next_id)
    } else {
        None
    };
    tx.commit()?;

    Ok(match next {
        Some(next_id) => get(conn, &next_id)?,
        None => None,
    })
}

pub fn delete(conn: &mut Connection, id: &str, actor: &Actor) -> Result<()> {
    crate::users::ensure_allowed(conn, actor)?;
    let _ = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "reminder", id: id.to_string() })?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
    crate::audit::append(&tx, "reminder", id, "deleted", actor, None)?;
    tx.commit()?;
    Ok(())
}

fn row_to_reminder(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        owner_user_id: row.get(2)?,
        fire_at: row.get(3)?,
        recurrence_minutes: row.get(4)?,
        fired: row.get::<_, i64>(5)? != 0,
        text: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
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
            content: Some("dentist appointment"),
            media_type: None,
            media_file_id: None,
            media_local_path: None,
        }).unwrap();
        (conn, mem.id)
    }

    #[test]
    fn firing_non_recurring_reminder_spawns_nothing() {
        let (mut conn, memory_id) = setup();
        let r = create(&mut conn, &Actor::User(1), NewReminder {
            memory_id: Some(&memory_id),
            owner_user_id: 1,
            fire_at: "2026-01-01T09:00:00.000Z",
            recurrence_minutes: None,
            text: Some("go to dentist"),
        }).unwrap();

        let next = mark_fired(&mut conn, &r.id).unwrap();
        assert!(next.is_none());
        let fired = get(&conn, &r.id).unwrap().unwrap();
        assert!(fired.fired);
    }

    #[test]
    fn firing_recurring_reminder_spawns_next_with_offset_fire_at() {
        let (mut conn, memory_id) = setup();
        let r = create(&mut conn, &Actor::User(1), NewReminder {
            memory_id: Some(&memory_id),
            owner_user_id: 1,
            fire_at: "2026-01-01T09:00:00.000Z",
            recurrence_minutes: Some(60),
            text: Some("take medicine"),
        }).unwrap();

        let next = mark_fired(&mut conn, &r.id).unwrap().expect("recurring reminder must spawn a successor");
        assert_eq!(next.fire_at, "2026-01-01T10:00:00.000Z");
        assert!(!next.fired);
    }

    #[test]
    fn list_due_only_returns_unfired_past_reminders() {
        let (mut conn, memory_id) = setup();
        let past = create(&mut conn, &Actor::User(1), NewReminder {
            memory_id: Some(&memory_id), owner_user_id: 1, fire_at: "2020-01-01T00:00:00.000Z",
            recurrence_minutes: None, text: None,
        }).unwrap();
        let future = create(&mut conn, &Actor::User(1), NewReminder {
            memory_id: Some(&memory_id), owner_user_id: 1, fire_at: "2099-01-01T00:00:00.000Z",
            recurrence_minutes: None, text: None,
        }).unwrap();

        let due = list_due(&conn, &now_iso()).unwrap();
        let ids: Vec<&str> = due.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&past.id.as_str()));
        assert!(!ids.contains(&future.id.as_str()));
    }
}

use rusqlite::{params, Connection, OptionalExtension};

use bearmemori_core::{now_iso, Actor, EntityId};

use crate::error::{Result, StoreError};
use crate::reminders::{self, NewReminder};
use crate::types::Event;

pub struct NewEvent<'a> {
    pub memory_id: Option<&'a str>,
    pub owner_user_id: i64,
    pub description: &'a str,
    pub event_time: &'a str,
    pub source_type: &'a str,
    pub source_detail: Option<&'a str>,
}

/// Events start `pending` regardless of source; confirmation is always an
/// explicit transition.
pub fn create(conn: &mut Connection, actor: &Actor, new: NewEvent<'_>) -> Result<Event> {
    crate::users::ensure_allowed(conn, actor)?;
    let id = EntityId::new().to_string();
    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO events (id, memory_id, owner_user_id, description, event_time, source_type,
         source_detail, status, pending_since, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8, ?8)",
        params![id, new.memory_id, new.owner_user_id, new.description, new.event_time, new.source_type, new.source_detail, now],
    )?;
    crate::audit::append(&tx, "event", &id, "created", actor, None)?;
    tx.commit()?;
    get(conn, &id)?.ok_or_else(|| StoreError::NotFound { entity: "event", id })
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Event>> {
    conn.query_row(
        "SELECT id, memory_id, owner_user_id, description, event_time, source_type, source_detail,
                status, pending_since, reminder_id, confirmed_at, created_at, updated_at
         FROM events WHERE id = ?1",
        params![id],
        row_to_event,
    )
    .optional()
    .map_err(StoreError::from)
}

/// Confirming an event creates a linked Reminder with `fire_at = event_time`
/// and stores its id on the event row.
pub fn confirm(conn: &mut Connection, id: &str, actor: &Actor) -> Result<Event> {
    crate::users::ensure_allowed(conn, actor)?;
    let event = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "event", id: id.to_string() })?;
    if event.status != "pending" {
        return Err(StoreError::Conflict(format!("event {id} is not pending")));
    }

    let reminder = reminders::create(
        conn,
        actor,
        NewReminder {
            memory_id: event.memory_id.as_deref(),
            owner_user_id: event.owner_user_id,
            fire_at: &event.event_time,
            recurrence_minutes: None,
            text: Some(&event.description),
        },
    )?;

    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE events SET status = 'confirmed', confirmed_at = ?1, reminder_id = ?2, updated_at = ?1
         WHERE id = ?3",
        params![now, reminder.id, id],
    )?;
    crate::audit::append(&tx, "event", id, "confirmed", actor, Some(&serde_json::json!({ "reminder_id": reminder.id })))?;
    tx.commit()?;

    get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "event", id: id.to_string() })
}

pub fn reject(conn: &mut Connection, id: &str, actor: &Actor) -> Result<Event> {
    crate::users::ensure_allowed(conn, actor)?;
    let event = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "event", id: id.to_string() })?;
    if event.status != "pending" {
        return Err(StoreError::Conflict(format!("event {id} is not pending")));
    }
    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE events SET status = 'rejected', updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    crate::audit::append(&tx, "event", id, "rejected", actor, None)?;
    tx.commit()?;
    get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "event", id: id.to_string() })
}

/// Events pending for at least `stale_after_hours`, for the scheduler's
/// re-prompt task.
pub fn list_stale_pending(conn: &Connection, cutoff: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, memory_id, owner_user_id, description, event_time, source_type, source_detail,
                status, pending_since, reminder_id, confirmed_at, created_at, updated_at
         FROM events WHERE status = 'pending' AND pending_since <= ?1",
    )?;
    let rows = stmt.query_map(params![cutoff], row_to_event)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Reset `pending_since` to now after publishing a re-prompt notification.
pub fn reset_pending_since(conn: &mut Connection, id: &str) -> Result<()> {
    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE events SET pending_since = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    crate::audit::append(&tx, "event", id, "requeued", &Actor::System,
        Some(&serde_json::json!({ "reason": "pending_24h_reprompt" })))?;
    tx.commit()?;
    Ok(())
}

pub fn delete(conn: &mut Connection, id: &str, actor: &Actor) -> Result<()> {
    crate::users::ensure_allowed(conn, actor)?;
    let _ = get(conn, id)?.ok_or_else(|| StoreError::NotFound { entity: "event", id: id.to_string() })?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM events WHERE id = ?1", params![id])?;
    crate::audit::append(&tx, "event", id, "deleted", actor, None)?;
    tx.commit()?;
    Ok(())
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        owner_user_id: row.get(2)?,
        description: row.get(3)?,
        event_time: row.get(4)?,
        source_type: row.get(5)?,
        source_detail: row.get(6)?,
        status: row.get(7)?,
        pending_since: row.get(8)?,
        reminder_id: row.get(9)?,
        confirmed_at: row.get(10)?,
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
    fn confirming_event_creates_linked_reminder() {
        let mut conn = setup();
        let ev = create(&mut conn, &Actor::User(1), NewEvent {
            memory_id: None,
            owner_user_id: 1,
            description: "flight departs".into(),
            event_time: "2026-03-01T08:00:00.000Z",
            source_type: "email",
            source_detail: Some("inbox msg 42"),
        }).unwrap();

        let confirmed = confirm(&mut conn, &ev.id, &Actor::User(1)).unwrap();
        assert_eq!(confirmed.status, "confirmed");
        let reminder_id = confirmed.reminder_id.expect("confirm must link a reminder");
        let reminder = reminders::get(&conn, &reminder_id).unwrap().unwrap();
        assert_eq!(reminder.fire_at, "2026-03-01T08:00:00.000Z");
    }

    #[test]
    fn rejecting_pending_event_sets_status() {
        let mut conn = setup();
        let ev = create(&mut conn, &Actor::User(1), NewEvent {
            memory_id: None,
            owner_user_id: 1,
            description: "maybe a meeting".into(),
            event_time: "2026-03-01T08:00:00.000Z",
            source_type: "email",
            source_detail: None,
        }).unwrap();

        let rejected = reject(&mut conn, &ev.id, &Actor::User(1)).unwrap();
        assert_eq!(rejected.status, "rejected");
        assert!(confirm(&mut conn, &ev.id, &Actor::User(1)).is_err());
    }

    #[test]
    fn stale_pending_events_are_listed_for_reprompt() {
        let mut conn = setup();
        let ev = create(&mut conn, &Actor::User(1), NewEvent {
            memory_id: None,
            owner_user_id: 1,
            description: "unconfirmed event".into(),
            event_time: "2026-03-01T08:00:00.000Z",
            source_type: "manual",
            source_detail: None,
        }).unwrap();

        // pending_since is "now" at creation, so a future cutoff catches it.
        let far_future = "2099-01-01T00:00:00.000Z";
        let stale = list_stale_pending(&conn, far_future).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, ev.id);

        reset_pending_since(&mut conn, &ev.id).unwrap();
        let still_stale = list_stale_pending(&conn, far_future).unwrap();
        assert_eq!(still_stale.len(), 1, "reset only bumps the timestamp, cutoff is still in the future");
    }
}

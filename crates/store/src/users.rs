use rusqlite::{params, Connection};

use bearmemori_core::{now_iso, Actor};

use crate::error::{Result, StoreError};
use crate::types::{User, UserSettings};

/// Create a user and its settings row together, returning a caller-usable
/// row immediately rather than requiring a follow-up query.
pub fn get_or_create(
    conn: &mut Connection,
    user_id: i64,
    display_name: &str,
) -> Result<(User, UserSettings)> {
    if let Some(user) = get(conn, user_id)? {
        let settings = get_settings(conn, user_id)?
            .ok_or_else(|| StoreError::NotFound { entity: "user_settings", id: user_id.to_string() })?;
        return Ok((user, settings));
    }

    let now = now_iso();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO users (user_id, display_name, is_allowed, created_at) VALUES (?1, ?2, 1, ?3)",
        params![user_id, display_name, now],
    )?;
    tx.execute(
        "INSERT INTO user_settings (user_id, timezone, language, created_at, updated_at)
         VALUES (?1, 'UTC', 'en', ?2, ?2)",
        params![user_id, now],
    )?;
    crate::audit::append(&tx, "user", &user_id.to_string(), "created", &Actor::System, None)?;
    tx.commit()?;

    Ok((
        User { user_id, display_name: display_name.to_string(), is_allowed: true, created_at: now.clone() },
        UserSettings { user_id, timezone: "UTC".into(), language: "en".into(), created_at: now.clone(), updated_at: now },
    ))
}

pub fn get(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    conn.query_row(
        "SELECT user_id, display_name, is_allowed, created_at FROM users WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(User {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                is_allowed: row.get::<_, i64>(2)? != 0,
                created_at: row.get(3)?,
            })
        },
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(StoreError::from(other)),
    })
}

pub fn get_settings(conn: &Connection, user_id: i64) -> Result<Option<UserSettings>> {
    conn.query_row(
        "SELECT user_id, timezone, language, created_at, updated_at FROM user_settings WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(UserSettings {
                user_id: row.get(0)?,
                timezone: row.get(1)?,
                language: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(StoreError::from(other)),
    })
}

pub fn update_settings(
    conn: &mut Connection,
    user_id: i64,
    timezone: Option<&str>,
    language: Option<&str>,
) -> Result<UserSettings> {
    ensure_allowed(conn, &Actor::User(user_id))?;
    let existing = get_settings(conn, user_id)?
        .ok_or_else(|| StoreError::NotFound { entity: "user_settings", id: user_id.to_string() })?;
    let now = now_iso();
    let new_tz = timezone.unwrap_or(&existing.timezone).to_string();
    let new_lang = language.unwrap_or(&existing.language).to_string();

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE user_settings SET timezone = ?1, language = ?2, updated_at = ?3 WHERE user_id = ?4",
        params![new_tz, new_lang, now, user_id],
    )?;
    let detail = serde_json::json!({ "prior_timezone": existing.timezone, "prior_language": existing.language });
    crate::audit::append(&tx, "user_settings", &user_id.to_string(), "updated", &Actor::User(user_id), Some(&detail))?;
    tx.commit()?;

    Ok(UserSettings { user_id, timezone: new_tz, language: new_lang, created_at: existing.created_at, updated_at: now })
}

/// Whether `user_id` may mutate anything. Unknown users are not allowed.
pub fn is_allowed(conn: &Connection, user_id: i64) -> Result<bool> {
    Ok(get(conn, user_id)?.map(|u| u.is_allowed).unwrap_or(false))
}

/// Gate called at the top of every store mutation that's attributable to a
/// user. `System`/`LlmWorker` actors bypass the check — the allow-list
/// restricts end users, not internal processes acting on their behalf.
pub fn ensure_allowed(conn: &Connection, actor: &Actor) -> Result<()> {
    if let Actor::User(user_id) = actor {
        if !is_allowed(conn, *user_id)? {
            return Err(StoreError::Forbidden(format!("user {user_id} is not allowed to perform mutations")));
        }
    }
    Ok(())
}

pub fn set_allowed(conn: &mut Connection, user_id: i64, allowed: bool, actor: &Actor) -> Result<()> {
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE users SET is_allowed = ?1 WHERE user_id = ?2",
        params![allowed as i64, user_id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound { entity: "user", id: user_id.to_string() });
    }
    let detail = serde_json::json!({ "is_allowed": allowed });
    crate::audit::append(&tx, "user", &user_id.to_string(), "updated", actor, Some(&detail))?;
    tx.commit()?;
    Ok(())
}

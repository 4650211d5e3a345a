use rusqlite::{params, Connection, OptionalExtension};

use bearmemori_core::{now_iso, Actor, EntityId, JobType};

use crate::error::{Result, StoreError};
use crate::types::LLMJob;

/// Insert a job row in `queued` state. The dispatcher publishes to the
/// matching stream immediately after this commits; this
/// function only owns the row.
pub fn create(conn: &mut Connection, job_type: JobType, payload: &serde_json::Value, user_id: Option<i64>) -> Result<LLMJob> {
    let id = EntityId::new().to_string();
    let now = now_iso();
    let payload_str = payload.to_string();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO llm_jobs (id, job_type, payload, user_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'queued', ?5, ?5)",
        params![id, job_type.as_str(), payload_str, user_id, now],
    )?;
    crate::audit::append(&tx, "llm_job", &id, "created", &Actor::System, None)?;
    tx.commit()?;
    get(conn, &id)?.ok_or_else(|| StoreError::NotFound { entity: "llm_job", id })
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<LLMJob>> {
    conn.query_row(
        "SELECT id, job_type, payload, user_id, status, result, error_message, created_at, updated_at
         FROM llm_jobs WHERE id = ?1",
        params![id],
        row_to_job,
    )
    .optional()
    .map_err(StoreError::from)
}

/// Only the worker owns `queued → processing → (completed|failed)`
/// transitions.
pub fn mark_processing(conn: &mut Connection, id: &str) -> Result<()> {
    transition(conn, id, "processing", None, None)
}

pub fn mark_completed(conn: &mut Connection, id: &str, result: &serde_json::Value) -> Result<()> {
    transition(conn, id, "completed", Some(&result.to_string()), None)
}

pub fn mark_failed(conn: &mut Connection, id: &str, error_message: &str) -> Result<()> {
    transition(conn, id, "failed", None, Some(error_message))
}

fn transition(conn: &mut Connection, id: &str, status: &str, result: Option<&str>, error: Option<&str>) -> Result<()> {
    let now = now_iso();
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE llm_jobs SET status = ?1, result = COALESCE(?2, result),
         error_message = COALESCE(?3, error_message), updated_at = ?4 WHERE id = ?5",
        params![status, result, error, now, id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound { entity: "llm_job", id: id.to_string() });
    }
    crate::audit::append(&tx, "llm_job", id, "updated", &Actor::LlmWorker,
        Some(&serde_json::json!({ "status": status })))?;
    tx.commit()?;
    Ok(())
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<LLMJob> {
    Ok(LLMJob {
        id: row.get(0)?,
        job_type: row.get(1)?,
        payload: row.get(2)?,
        user_id: row.get(3)?,
        status: row.get(4)?,
        result: row.get(5)?,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn lifecycle_transitions_queued_to_completed() {
        let mut conn = db::open_in_memory().unwrap();
        let job = create(&mut conn, JobType::ImageTag, &serde_json::json!({"memory_id": "m1"}), Some(1)).unwrap();
        assert_eq!(job.status, "queued");

        mark_processing(&mut conn, &job.id).unwrap();
        assert_eq!(get(&conn, &job.id).unwrap().unwrap().status, "processing");

        mark_completed(&mut conn, &job.id, &serde_json::json!({"tags": ["cat"]})).unwrap();
        let done = get(&conn, &job.id).unwrap().unwrap();
        assert_eq!(done.status, "completed");
        assert!(done.result.is_some());
    }

    #[test]
    fn failed_job_keeps_error_message() {
        let mut conn = db::open_in_memory().unwrap();
        let job = create(&mut conn, JobType::EmailExtract, &serde_json::json!({}), None).unwrap();
        mark_processing(&mut conn, &job.id).unwrap();
        mark_failed(&mut conn, &job.id, "llm unavailable").unwrap();
        let failed = get(&conn, &job.id).unwrap().unwrap();
        assert_eq!(failed.status, "failed");
        assert_eq!(failed.error_message.as_deref(), Some("llm unavailable"));
    }
}

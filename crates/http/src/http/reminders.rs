use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use bearmemori_core::Actor;
use bearmemori_store::reminders::{self, NewReminder};
use bearmemori_store::types::Reminder;

use crate::{app::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct CreateReminderRequest {
    pub memory_id: Option<String>,
    pub owner_user_id: i64,
    pub fire_at: String,
    pub recurrence_minutes: Option<i64>,
    pub text: Option<String>,
}

pub async fn create_reminder(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateReminderRequest>,
) -> Result<Json<Reminder>, AppError> {
    let actor = Actor::User(req.owner_user_id);
    let reminder = state.store.with_conn(|conn| {
        reminders::create(
            conn,
            &actor,
            NewReminder {
                memory_id: req.memory_id.as_deref(),
                owner_user_id: req.owner_user_id,
                fire_at: &req.fire_at,
                recurrence_minutes: req.recurrence_minutes,
                text: req.text.as_deref(),
            },
        )
    })?;
    Ok(Json(reminder))
}

pub async fn get_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Reminder>, AppError> {
    let reminder = state
        .store
        .with_conn(|conn| reminders::get(conn, &id))?
        .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "reminder", id }))?;
    Ok(Json(reminder))
}

#[derive(Debug, Deserialize)]
pub struct PatchReminderRequest {
    pub fired: Option<bool>,
}

/// PATCH /reminders/{id} — the only server-side transition is manually
/// marking a reminder fired; `fire_at`/`text` are set once at creation
///.
pub async fn patch_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchReminderRequest>,
) -> Result<Json<Reminder>, AppError> {
    if req.fired == Some(true) {
        state.store.with_conn(|conn| reminders::mark_fired(conn, &id))?;
    }
    let reminder = state
        .store
        .with_conn(|conn| reminders::get(conn, &id))?
        .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "reminder", id }))?;
    Ok(Json(reminder))
}

pub async fn delete_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.with_conn(|conn| reminders::delete(conn, &id, &Actor::System))?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

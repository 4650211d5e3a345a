use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use bearmemori_core::Actor;
use bearmemori_store::events::{self, NewEvent};
use bearmemori_store::types::Event;

use crate::{app::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub memory_id: Option<String>,
    pub owner_user_id: i64,
    pub description: String,
    pub event_time: String,
    pub source_type: String,
    pub source_detail: Option<String>,
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEventRequest>,
) -> Result<Json<Event>, AppError> {
    let actor = Actor::User(req.owner_user_id);
    let event = state.store.with_conn(|conn| {
        events::create(
            conn,
            &actor,
            NewEvent {
                memory_id: req.memory_id.as_deref(),
                owner_user_id: req.owner_user_id,
                description: &req.description,
                event_time: &req.event_time,
                source_type: &req.source_type,
                source_detail: req.source_detail.as_deref(),
            },
        )
    })?;
    Ok(Json(event))
}

pub async fn get_event(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Event>, AppError> {
    let event = state
        .store
        .with_conn(|conn| events::get(conn, &id))?
        .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "event", id }))?;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
pub struct PatchEventRequest {
    pub status: String,
    pub actor_user_id: Option<i64>,
}

/// PATCH /events/{id} — `confirmed` auto-creates the linked reminder
///; `rejected` is a terminal no-op transition.
pub async fn patch_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchEventRequest>,
) -> Result<Json<Event>, AppError> {
    let actor = req.actor_user_id.map(Actor::User).unwrap_or(Actor::System);
    let event = match req.status.as_str() {
        "confirmed" => state.store.with_conn(|conn| events::confirm(conn, &id, &actor))?,
        "rejected" => state.store.with_conn(|conn| events::reject(conn, &id, &actor))?,
        other => return Err(AppError::Validation(format!("unsupported event status transition: {other}"))),
    };
    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.with_conn(|conn| events::delete(conn, &id, &Actor::System))?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

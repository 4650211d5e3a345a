use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use bearmemori_core::Actor;
use bearmemori_store::tasks::{self, NewTask};
use bearmemori_store::types::Task;

use crate::{app::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub memory_id: String,
    pub owner_user_id: i64,
    pub description: String,
    pub due_at: Option<String>,
    pub recurrence_minutes: Option<i64>,
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let actor = Actor::User(req.owner_user_id);
    let task = state.store.with_conn(|conn| {
        tasks::create(
            conn,
            &actor,
            NewTask {
                memory_id: &req.memory_id,
                owner_user_id: req.owner_user_id,
                description: &req.description,
                due_at: req.due_at.as_deref(),
                recurrence_minutes: req.recurrence_minutes,
            },
        )
    })?;
    Ok(Json(task))
}

pub async fn get_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Task>, AppError> {
    let task = state
        .store
        .with_conn(|conn| tasks::get(conn, &id))?
        .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "task", id }))?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub owner_user_id: i64,
    pub state: Option<String>,
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state
        .store
        .with_conn(|conn| tasks::list_for_owner(conn, q.owner_user_id, q.state.as_deref()))?;
    Ok(Json(tasks))
}

#[derive(Debug, Deserialize)]
pub struct PatchTaskRequest {
    pub state: Option<String>,
    pub actor_user_id: Option<i64>,
}

/// PATCH /tasks/{id} — recurrence semantics are enforced server-side on the
/// `DONE` transition; no other field is mutable after creation.
pub async fn patch_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let actor = req.actor_user_id.map(Actor::User).unwrap_or(Actor::System);
    match req.state.as_deref() {
        Some("DONE") => {
            let (task, _spawned) = state.store.with_conn(|conn| tasks::complete(conn, &id, &actor))?;
            Ok(Json(task))
        }
        Some(other) => Err(AppError::Validation(format!("unsupported task state transition: {other}"))),
        None => {
            let task = state
                .store
                .with_conn(|conn| tasks::get(conn, &id))?
                .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "task", id }))?;
            Ok(Json(task))
        }
    }
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.with_conn(|conn| tasks::delete(conn, &id, &Actor::System))?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

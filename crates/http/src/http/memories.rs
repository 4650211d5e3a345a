use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use bearmemori_core::Actor;
use bearmemori_store::memories::{self, NewMemory};
use bearmemori_store::types::Memory;

use crate::{app::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct CreateMemoryRequest {
    pub owner_user_id: i64,
    pub source_chat_id: Option<i64>,
    pub source_message_id: Option<i64>,
    pub content: Option<String>,
    pub media_type: Option<String>,
    pub media_file_id: Option<String>,
    pub media_local_path: Option<String>,
}

/// POST /memories — creates confirmed text or pending image.
pub async fn create_memory(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMemoryRequest>,
) -> Result<Json<Memory>, AppError> {
    let actor = Actor::User(req.owner_user_id);
    let mem = state.store.with_conn(|conn| {
        memories::create(
            conn,
            &actor,
            NewMemory {
                owner_user_id: req.owner_user_id,
                source_chat_id: req.source_chat_id,
                source_message_id: req.source_message_id,
                content: req.content.as_deref(),
                media_type: req.media_type.as_deref(),
                media_file_id: req.media_file_id.as_deref(),
                media_local_path: req.media_local_path.as_deref(),
            },
        )
    })?;
    Ok(Json(mem))
}

pub async fn get_memory(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Memory>, AppError> {
    let mem = state
        .store
        .with_conn(|conn| memories::get(conn, &id))?
        .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "memory", id }))?;
    Ok(Json(mem))
}

#[derive(Debug, Deserialize)]
pub struct PatchMemoryRequest {
    pub content: Option<String>,
    pub status: Option<String>,
    pub is_pinned: Option<bool>,
    pub actor_user_id: Option<i64>,
}

/// PATCH /memories/{id} — supports content edit, `status: "confirmed"`
/// transition, and pin toggling.
pub async fn patch_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchMemoryRequest>,
) -> Result<Json<Memory>, AppError> {
    let actor = req.actor_user_id.map(Actor::User).unwrap_or(Actor::System);

    if let Some(status) = &req.status {
        if status != "confirmed" {
            return Err(AppError::Validation(format!("unsupported status transition: {status}")));
        }
        state.store.with_conn(|conn| memories::confirm(conn, &id, &actor))?;
    }
    if let Some(content) = &req.content {
        state.store.with_conn(|conn| memories::set_content(conn, &id, content, &actor))?;
    }
    if let Some(pinned) = req.is_pinned {
        state.store.with_conn(|conn| memories::set_pinned(conn, &id, pinned, &actor))?;
    }

    let mem = state
        .store
        .with_conn(|conn| memories::get(conn, &id))?
        .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "memory", id }))?;
    Ok(Json(mem))
}

pub async fn delete_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let media_path = state.store.with_conn(|conn| memories::delete(conn, &id, &Actor::System, "user_requested"))?;
    if let Some(path) = media_path {
        let _ = tokio::fs::remove_file(&path).await;
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct TagEntry {
    pub tag: String,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddTagsRequest {
    pub tags: Vec<TagEntry>,
    pub actor_user_id: Option<i64>,
}

/// POST /memories/{id}/tags — accepts a list with per-tag status
///.
pub async fn add_tags(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddTagsRequest>,
) -> Result<Json<Vec<bearmemori_store::types::MemoryTag>>, AppError> {
    let actor = req.actor_user_id.map(Actor::User).unwrap_or(Actor::System);
    state.store.with_conn(|conn| {
        for entry in &req.tags {
            memories::add_tag(conn, &id, &entry.tag, entry.confirmed, &actor)?;
        }
        Ok(())
    })?;
    let tags = state.store.with_conn(|conn| memories::list_tags(conn, &id))?;
    Ok(Json(tags))
}

pub async fn remove_tag(
    State(state): State<Arc<AppState>>,
    Path((id, tag)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.with_conn(|conn| memories::remove_tag(conn, &id, &tag, &Actor::System))?;
    Ok(Json(serde_json::json!({ "removed": true })))
}

#[derive(Debug, Serialize)]
pub struct UploadImageResponse {
    pub memory: Memory,
    pub stored_path: String,
}

/// POST /memories/{id}/image — multipart upload of the image bytes for a
/// memory whose row was already created.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadImageResponse>, AppError> {
    let mut bytes: Option<axum::body::Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("failed to read image field: {e}")))?,
            );
        }
    }
    let bytes = bytes.ok_or_else(|| AppError::Validation("multipart body missing 'image' field".to_string()))?;

    let dest = format!("{}/{id}.jpg", state.config.database.image_storage_path);
    tokio::fs::create_dir_all(&state.config.database.image_storage_path)
        .await
        .map_err(|e| AppError::Validation(format!("failed to prepare storage path: {e}")))?;
    tokio::fs::write(&dest, &bytes)
        .await
        .map_err(|e| AppError::Validation(format!("failed to write image: {e}")))?;

    let mem = state.store.with_conn(|conn| memories::attach_image_file(conn, &id, &dest, &Actor::System))?;
    Ok(Json(UploadImageResponse { memory: mem, stored_path: dest }))
}

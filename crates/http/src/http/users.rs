use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use bearmemori_store::types::{User, UserSettings};

use crate::{app::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub user_id: i64,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
    pub settings: UserSettings,
}

/// POST /users — idempotent upsert.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let (user, settings) = state
        .store
        .with_conn(|conn| bearmemori_store::users::get_or_create(conn, req.user_id, &req.display_name))?;
    Ok(Json(UserResponse { user, settings }))
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserSettings>, AppError> {
    let settings = state
        .store
        .with_conn(|conn| bearmemori_store::users::get_settings(conn, user_id))?
        .ok_or_else(|| AppError::Validation(format!("no settings for user {user_id}")))?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub timezone: Option<String>,
    pub language: Option<String>,
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<UserSettings>, AppError> {
    let settings = state.store.with_conn(|conn| {
        bearmemori_store::users::update_settings(conn, user_id, req.timezone.as_deref(), req.language.as_deref())
    })?;
    Ok(Json(settings))
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use bearmemori_core::JobType;
use bearmemori_store::types::LLMJob;

use crate::{app::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub user_id: Option<i64>,
}

/// POST /llm_jobs — the dispatcher entrypoint.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job_type: JobType = req.job_type.parse().map_err(AppError::Validation)?;
    let job_id = state.dispatcher.enqueue(job_type, req.payload, req.user_id).await?;
    Ok(Json(serde_json::json!({ "job_id": job_id })))
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<LLMJob>, AppError> {
    let job = state
        .store
        .with_conn(|conn| bearmemori_store::jobs::get(conn, &id))?
        .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "llm_job", id }))?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct PatchJobRequest {
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// PATCH /llm_jobs/{id} — worker status updates. The worker
/// itself talks to the store directly; this exists for external/out-of-
/// process job runners.
pub async fn patch_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchJobRequest>,
) -> Result<Json<LLMJob>, AppError> {
    match req.status.as_str() {
        "processing" => state.store.with_conn(|conn| bearmemori_store::jobs::mark_processing(conn, &id))?,
        "completed" => {
            let result = req.result.unwrap_or(serde_json::Value::Null);
            state.store.with_conn(|conn| bearmemori_store::jobs::mark_completed(conn, &id, &result))?
        }
        "failed" => {
            let message = req.error_message.unwrap_or_default();
            state.store.with_conn(|conn| bearmemori_store::jobs::mark_failed(conn, &id, &message))?
        }
        other => return Err(AppError::Validation(format!("unsupported job status: {other}"))),
    }

    let job = state
        .store
        .with_conn(|conn| bearmemori_store::jobs::get(conn, &id))?
        .ok_or_else(|| AppError::Store(bearmemori_store::StoreError::NotFound { entity: "llm_job", id }))?;
    Ok(Json(job))
}

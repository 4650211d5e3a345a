use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use bearmemori_store::types::AuditLog;

use crate::{app::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub entity_type: String,
    pub entity_id: String,
}

/// GET /audit with filters — scoped to one entity at a time,
/// matching the only index `bearmemori_store::audit` maintains.
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLog>>, AppError> {
    let entries = state
        .store
        .with_conn(|conn| bearmemori_store::audit::list_for_entity(conn, &q.entity_type, &q.entity_id))?;
    Ok(Json(entries))
}

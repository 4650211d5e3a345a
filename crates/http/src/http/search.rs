use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use bearmemori_search::{self, SearchFilters, SearchHit};

use crate::{app::AppState, error::AppError};

#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    pub q: String,
    pub owner: Option<i64>,
    pub pinned: Option<bool>,
    pub media_type: Option<String>,
}

/// GET /search?q=&owner=&pinned=.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let filters = SearchFilters {
        owner_user_id: params.owner,
        pinned: params.pinned,
        media_type: params.media_type,
        created_after: None,
        created_before: None,
    };
    let hits = state.store.with_raw_conn(|conn| bearmemori_search::search(conn, &params.q, &filters))?;
    Ok(Json(hits))
}

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use bearmemori_dispatcher::DispatchError;
use bearmemori_search::SearchError;
use bearmemori_store::StoreError;

/// Thin error wrapper so every handler can return `Result<T, AppError>` and
/// get the not-found/validation/conflict status mapping for free from one
/// place instead of each handler building its own `(StatusCode, Json<Value>)`.
pub enum AppError {
    Store(StoreError),
    Search(SearchError),
    Dispatch(DispatchError),
    Validation(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        AppError::Search(e)
    }
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        AppError::Dispatch(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::Store(StoreError::NotFound { entity, id }) => {
                (StatusCode::NOT_FOUND, format!("{entity} not found: {id}"))
            }
            AppError::Store(StoreError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Store(StoreError::Conflict(msg)) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Store(StoreError::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Search(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Dispatch(DispatchError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Dispatch(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use bearmemori_core::BearMemoriConfig;
use bearmemori_dispatcher::Dispatcher;
use bearmemori_store::Store;

/// Central shared state — passed as `Arc<AppState>` to every handler so the
/// store, dispatcher, and config all live behind one clone-cheap Arc.
pub struct AppState {
    pub store: Arc<Store>,
    pub dispatcher: Dispatcher,
    pub config: BearMemoriConfig,
}

impl AppState {
    pub fn new(store: Arc<Store>, dispatcher: Dispatcher, config: BearMemoriConfig) -> Self {
        Self { store, dispatcher, config }
    }
}

/// Assemble the full Axum router. Entity CRUD, search, and job management
/// only — no WebSocket or chat-pipeline surface.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/users", post(crate::http::users::create_user))
        .route(
            "/settings/{user_id}",
            get(crate::http::users::get_settings).put(crate::http::users::update_settings),
        )
        .route("/memories", post(crate::http::memories::create_memory))
        .route(
            "/memories/{id}",
            get(crate::http::memories::get_memory)
                .patch(crate::http::memories::patch_memory)
                .delete(crate::http::memories::delete_memory),
        )
        .route("/memories/{id}/tags", post(crate::http::memories::add_tags))
        .route("/memories/{id}/tags/{tag}", delete(crate::http::memories::remove_tag))
        .route("/memories/{id}/image", post(crate::http::memories::upload_image))
        .route(
            "/tasks",
            post(crate::http::tasks::create_task).get(crate::http::tasks::list_tasks),
        )
        .route(
            "/tasks/{id}",
            get(crate::http::tasks::get_task)
                .patch(crate::http::tasks::patch_task)
                .delete(crate::http::tasks::delete_task),
        )
        .route(
            "/reminders",
            post(crate::http::reminders::create_reminder),
        )
        .route(
            "/reminders/{id}",
            get(crate::http::reminders::get_reminder)
                .patch(crate::http::reminders::patch_reminder)
                .delete(crate::http::reminders::delete_reminder),
        )
        .route("/events", post(crate::http::events::create_event))
        .route(
            "/events/{id}",
            get(crate::http::events::get_event)
                .patch(crate::http::events::patch_event)
                .delete(crate::http::events::delete_event),
        )
        .route("/search", get(crate::http::search::search_handler))
        .route("/llm_jobs", post(crate::http::jobs::create_job))
        .route(
            "/llm_jobs/{id}",
            get(crate::http::jobs::get_job).patch(crate::http::jobs::patch_job),
        )
        .route("/audit", get(crate::http::audit::list_audit))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

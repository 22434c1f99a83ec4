use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::web::handlers::{enqueue_album, enqueue_folder, events_ws, queue_status};
use crate::web::AppState;

pub fn create_router(state: AppState) -> Router<()> {
    Router::new()
        .route("/api/queue/folder", post(enqueue_folder))
        .route("/api/queue/album/{id}", post(enqueue_album))
        .route("/api/queue/status", get(queue_status))
        .route("/api/events", get(events_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

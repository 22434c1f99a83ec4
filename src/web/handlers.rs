use std::path::PathBuf;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueFolderRequest {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueAlbumRequest {
    #[serde(default)]
    pub release_id: Option<String>,
    #[serde(default = "default_true")]
    pub user_initiated: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub queue_depth: usize,
    pub is_processing: bool,
}

/// `POST /api/queue/folder`, `enqueueFolder(path)`.
pub async fn enqueue_folder(State(state): State<AppState>, Json(req): Json<EnqueueFolderRequest>) -> impl IntoResponse {
    state.queue.enqueue_folder(req.path);
    axum::http::StatusCode::ACCEPTED
}

/// `POST /api/queue/album/:id`, `enqueueAlbum(albumId, releaseId?, userInitiated)`.
pub async fn enqueue_album(State(state): State<AppState>, Path(album_id): Path<Uuid>, Json(req): Json<EnqueueAlbumRequest>) -> impl IntoResponse {
    state.queue.enqueue_album(album_id, req.release_id, req.user_initiated);
    axum::http::StatusCode::ACCEPTED
}

/// `GET /api/queue/status`, `queueDepth`/`isProcessing`.
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(QueueStatus { queue_depth: state.queue.depth(), is_processing: state.queue.is_processing() })
}

/// `GET /api/events`, upgrades to a WebSocket streaming every
/// `ProgressEvent` as JSON.
pub async fn events_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

async fn stream_events(mut socket: WebSocket, state: AppState) {
    let mut receiver = state.events.subscribe();
    loop {
        tokio::select! {
            event = receiver.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                if incoming.is_none() {
                    break;
                }
            }
        }
    }
}

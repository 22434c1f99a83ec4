use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::core::orchestrator::ProgressEvent;
use crate::core::queue::WorkQueue;
use crate::repository::RepositoryError;

pub mod handlers;
pub mod routes;

#[derive(Debug, thiserror::Error)]
pub enum WebLayerError {
    #[error("{0}")]
    RepositoryError(#[from] RepositoryError),
}

/// Thin façade over the Work Queue/Orchestrator: request handlers never
/// mutate anything themselves, they only enqueue and report queue/progress
/// state.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub queue: WorkQueue,
    pub events: broadcast::Sender<ProgressEvent>,
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Append-only record of a notable pipeline event, surfaced to the façade.
#[derive(Debug, Clone)]
pub struct ActivityLogEntry {
    id: Uuid,
    album_id: Option<Uuid>,
    action: String,
    details: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(id: Uuid, album_id: Option<Uuid>, action: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { id, album_id, action: action.into(), details: None, timestamp }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn album_id(&self) -> Option<Uuid> {
        self.album_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

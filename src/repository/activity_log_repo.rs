use chrono::NaiveDateTime;
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use crate::domain::ActivityLogEntry;
use super::RepositoryError;

#[derive(FromRow)]
struct DbActivityLogEntry {
    id: String,
    album_id: Option<String>,
    action: String,
    details: Option<String>,
    timestamp: NaiveDateTime,
}

impl TryFrom<DbActivityLogEntry> for ActivityLogEntry {
    type Error = uuid::Error;

    fn try_from(row: DbActivityLogEntry) -> Result<Self, Self::Error> {
        let album_id = row.album_id.map(|id| Uuid::parse_str(&id)).transpose()?;
        let mut entry = ActivityLogEntry::new(Uuid::parse_str(&row.id)?, album_id, row.action, row.timestamp.and_utc());
        if let Some(details) = row.details {
            entry = entry.with_details(details);
        }
        Ok(entry)
    }
}

pub struct SqliteActivityLogRepository;

impl SqliteActivityLogRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteActivityLogRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteActivityLogRepository {
    pub async fn record<'e, E>(&self, executor: E, entry: &ActivityLogEntry) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("INSERT INTO activity_log(id, album_id, action, details, timestamp) VALUES (?, ?, ?, ?, ?);")
            .bind(entry.id().to_string())
            .bind(entry.album_id().map(|id| id.to_string()))
            .bind(entry.action())
            .bind(entry.details())
            .bind(entry.timestamp().naive_utc())
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn recent<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<ActivityLogEntry>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, DbActivityLogEntry>(
            "SELECT id, album_id, action, details, timestamp FROM activity_log ORDER BY timestamp DESC LIMIT ?;",
        )
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        rows.into_iter()
            .map(|r| ActivityLogEntry::try_from(r).map_err(RepositoryError::UuidConversion))
            .collect()
    }
}

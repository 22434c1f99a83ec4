use std::path::PathBuf;

use chrono::NaiveDateTime;
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use crate::domain::{BackupAction, TagBackup, TrackTagSnapshot};
use super::{IntoUuid, RepositoryError};

#[derive(FromRow)]
struct DbTagBackup {
    id: String,
    album_id: String,
    action: String,
    created_at: NaiveDateTime,
}

#[derive(FromRow)]
struct DbTrackTagSnapshot {
    id: String,
    backup_id: String,
    track_id: String,
    path: String,
    tags_json: String,
    has_cover: i64,
    cover_path: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TagBackupConversionError {
    #[error("Uuid conversion error: {0}")]
    UuidConversion(#[from] uuid::Error),

    #[error("Unknown backup action: {0}")]
    UnknownAction(String),
}

impl TryFrom<DbTagBackup> for TagBackup {
    type Error = TagBackupConversionError;

    fn try_from(row: DbTagBackup) -> Result<Self, Self::Error> {
        let action: BackupAction = row.action.parse().map_err(TagBackupConversionError::UnknownAction)?;
        Ok(TagBackup::new(Uuid::parse_str(&row.id)?, Uuid::parse_str(&row.album_id)?, action, row.created_at.and_utc()))
    }
}

impl TryFrom<DbTrackTagSnapshot> for TrackTagSnapshot {
    type Error = uuid::Error;

    fn try_from(row: DbTrackTagSnapshot) -> Result<Self, Self::Error> {
        Ok(TrackTagSnapshot::new(
            Uuid::parse_str(&row.id)?,
            Uuid::parse_str(&row.backup_id)?,
            Uuid::parse_str(&row.track_id)?,
            PathBuf::from(row.path),
            row.tags_json,
            row.has_cover != 0,
            row.cover_path.map(PathBuf::from),
        ))
    }
}

pub struct SqliteTagBackupsRepository;

impl SqliteTagBackupsRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteTagBackupsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteTagBackupsRepository {
    pub async fn create_backup<'e, E>(&self, executor: E, backup: &TagBackup) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("INSERT INTO tag_backups(id, album_id, action, created_at) VALUES (?, ?, ?, ?);")
            .bind(backup.id().to_string())
            .bind(backup.album_id().to_string())
            .bind(backup.action().as_str())
            .bind(backup.created_at().naive_utc())
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn add_snapshot<'e, E>(&self, executor: E, snapshot: &TrackTagSnapshot) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO track_tag_snapshots(id, backup_id, track_id, path, tags_json, has_cover, cover_path) VALUES (?, ?, ?, ?, ?, ?, ?);",
        )
        .bind(snapshot.id().to_string())
        .bind(snapshot.backup_id().to_string())
        .bind(snapshot.track_id().to_string())
        .bind(snapshot.path().to_string_lossy().to_string())
        .bind(snapshot.tags_json())
        .bind(snapshot.has_cover() as i64)
        .bind(snapshot.cover_path().map(|p| p.to_string_lossy().to_string()))
        .execute(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn all_by_album<'e, E, ID>(&self, executor: E, album_id: ID) -> Result<Vec<TagBackup>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let album_id = album_id.into_uuid()?;
        let rows = sqlx::query_as::<_, DbTagBackup>(
            "SELECT id, album_id, action, created_at FROM tag_backups WHERE album_id = ? ORDER BY created_at DESC;",
        )
        .bind(album_id.to_string())
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        rows.into_iter()
            .map(|r| TagBackup::try_from(r).map_err(|e| RepositoryError::UnknownError(e.to_string())))
            .collect()
    }

    pub async fn snapshots_by_backup<'e, E, ID>(&self, executor: E, backup_id: ID) -> Result<Vec<TrackTagSnapshot>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let backup_id = backup_id.into_uuid()?;
        let rows = sqlx::query_as::<_, DbTrackTagSnapshot>(
            "SELECT id, backup_id, track_id, path, tags_json, has_cover, cover_path FROM track_tag_snapshots WHERE backup_id = ?;",
        )
        .bind(backup_id.to_string())
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        rows.into_iter().map(|r| TrackTagSnapshot::try_from(r).map_err(RepositoryError::UuidConversion)).collect()
    }

    /// Deletes the oldest backups for an album beyond `keep`. Returns the
    /// deleted rows' ids and backup directories so the caller can remove
    /// them from disk first.
    pub async fn prune<'e, E>(&self, executor: E, album_id: uuid::Uuid, keep: i64) -> Result<Vec<TagBackup>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, DbTagBackup>(
            "SELECT id, album_id, action, created_at FROM tag_backups WHERE album_id = ? ORDER BY created_at DESC LIMIT -1 OFFSET ?;",
        )
        .bind(album_id.to_string())
        .bind(keep)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        rows.into_iter()
            .map(|r| TagBackup::try_from(r).map_err(|e| RepositoryError::UnknownError(e.to_string())))
            .collect()
    }

    pub async fn delete<'e, E, ID>(&self, executor: E, backup_id: ID) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let backup_id = backup_id.into_uuid()?;
        sqlx::query("DELETE FROM tag_backups WHERE id = ?;")
            .bind(backup_id.to_string())
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }
}

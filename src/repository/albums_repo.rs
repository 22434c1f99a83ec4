use std::{path::PathBuf, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use crate::domain::{Album, AlbumStatus, ValidationError};
use super::{IntoUuid, RepositoryError};

#[derive(FromRow)]
struct DbAlbum {
    id: String,
    path: String,
    artist: Option<String>,
    album: Option<String>,
    year: Option<i64>,
    status: String,
    match_confidence: Option<f64>,
    musicbrainz_release_id: Option<String>,
    musicbrainz_release_group_id: Option<String>,
    cover_path: Option<String>,
    cover_url: Option<String>,
    track_count: Option<i64>,
    error_message: Option<String>,
    retry_count: i64,
    replaygain_album_gain: Option<String>,
    replaygain_album_peak: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum AlbumConversionError {
    #[error("Uuid conversion error: {0}")]
    UuidConversion(#[from] uuid::Error),

    #[error("Unknown album status: {0}")]
    UnknownStatus(String),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl TryFrom<DbAlbum> for Album {
    type Error = AlbumConversionError;

    fn try_from(row: DbAlbum) -> Result<Self, Self::Error> {
        let status = row.status.parse::<AlbumStatus>().map_err(|_| AlbumConversionError::UnknownStatus(row.status.clone()))?;

        let mut album = Album::new(
            Uuid::parse_str(&row.id)?,
            PathBuf::from_str(&row.path).unwrap(),
            row.artist,
            row.album,
            row.year.map(|y| y as i32),
            status,
            row.created_at.and_utc(),
            row.updated_at.and_utc(),
        )?;

        album.set_match_confidence(row.match_confidence);
        album.set_musicbrainz_release_id(row.musicbrainz_release_id);
        album.set_musicbrainz_release_group_id(row.musicbrainz_release_group_id);
        album.set_cover_path(row.cover_path.map(PathBuf::from));
        album.set_cover_url(row.cover_url);
        album.set_track_count(row.track_count);
        album.set_error_message(row.error_message);
        for _ in 0..row.retry_count {
            album.increment_retry_count();
        }
        album.set_replaygain(row.replaygain_album_gain, row.replaygain_album_peak);

        Ok(album)
    }
}

pub struct SqliteAlbumsRepository;

impl SqliteAlbumsRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteAlbumsRepository {
    fn default() -> Self {
        Self::new()
    }
}

const ALBUM_COLUMNS: &str = "id, path, artist, album, year, status, match_confidence, musicbrainz_release_id, \
     musicbrainz_release_group_id, cover_path, cover_url, track_count, error_message, retry_count, \
     replaygain_album_gain, replaygain_album_peak, created_at, updated_at";

impl SqliteAlbumsRepository {
    pub async fn save<'e, E>(&self, executor: E, album: &Album) -> Result<Album, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let path_str = album.path().to_string_lossy();
        let query = format!(
            "INSERT INTO albums({ALBUM_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?) RETURNING {ALBUM_COLUMNS};"
        );

        let row = sqlx::query_as::<_, DbAlbum>(&query)
            .bind(album.id().to_string())
            .bind(path_str.as_ref())
            .bind(album.artist())
            .bind(album.album())
            .bind(album.year().map(|y| y as i64))
            .bind(album.status().as_str())
            .bind(album.match_confidence())
            .bind(album.musicbrainz_release_id())
            .bind(album.musicbrainz_release_group_id())
            .bind(album.cover_path().map(|p| p.to_string_lossy().to_string()))
            .bind(album.cover_url())
            .bind(album.track_count())
            .bind(album.error_message())
            .bind(album.retry_count() as i64)
            .bind(album.replaygain_album_gain())
            .bind(album.replaygain_album_peak())
            .bind(album.created_at().naive_utc())
            .bind(album.updated_at().naive_utc())
            .fetch_one(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(row.try_into()?)
    }

    /// Full-row replace, used after the Orchestrator mutates an in-memory Album.
    pub async fn update<'e, E>(&self, executor: E, album: &Album) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE albums SET artist = ?, album = ?, year = ?, status = ?, match_confidence = ?, \
             musicbrainz_release_id = ?, musicbrainz_release_group_id = ?, cover_path = ?, cover_url = ?, \
             track_count = ?, error_message = ?, retry_count = ?, replaygain_album_gain = ?, \
             replaygain_album_peak = ?, updated_at = ? WHERE id = ?;",
        )
        .bind(album.artist())
        .bind(album.album())
        .bind(album.year().map(|y| y as i64))
        .bind(album.status().as_str())
        .bind(album.match_confidence())
        .bind(album.musicbrainz_release_id())
        .bind(album.musicbrainz_release_group_id())
        .bind(album.cover_path().map(|p| p.to_string_lossy().to_string()))
        .bind(album.cover_url())
        .bind(album.track_count())
        .bind(album.error_message())
        .bind(album.retry_count() as i64)
        .bind(album.replaygain_album_gain())
        .bind(album.replaygain_album_peak())
        .bind(album.updated_at().naive_utc())
        .bind(album.id().to_string())
        .execute(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::IdNotFound(album.id()));
        }
        Ok(())
    }

    pub async fn by_id_fetch<'e, E, ID>(&self, executor: E, id: ID) -> Result<Option<Album>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let id = id.into_uuid()?;
        let row = sqlx::query_as::<_, DbAlbum>(&format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ? LIMIT 1;"))
            .bind(id.to_string())
            .fetch_optional(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        row.map(Album::try_from).transpose().map_err(RepositoryError::AlbumDataMapping)
    }

    pub async fn by_path_fetch<'e, E>(&self, executor: E, path: &std::path::Path) -> Result<Option<Album>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let path_str = path.to_str().ok_or_else(|| RepositoryError::InvalidPathEncoding(path.to_path_buf()))?;
        let row = sqlx::query_as::<_, DbAlbum>(&format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE path = ? LIMIT 1;"))
            .bind(path_str)
            .fetch_optional(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        row.map(Album::try_from).transpose().map_err(RepositoryError::AlbumDataMapping)
    }

    pub async fn all_by_status<'e, E>(&self, executor: E, status: AlbumStatus) -> Result<Vec<Album>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, DbAlbum>(&format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE status = ?;"))
            .bind(status.as_str())
            .fetch_all(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        rows.into_iter().map(|r| Album::try_from(r).map_err(RepositoryError::AlbumDataMapping)).collect()
    }

    pub async fn all<'e, E>(&self, executor: E) -> Result<Vec<Album>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, DbAlbum>(&format!("SELECT {ALBUM_COLUMNS} FROM albums;"))
            .fetch_all(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        rows.into_iter().map(|r| Album::try_from(r).map_err(RepositoryError::AlbumDataMapping)).collect()
    }

    pub async fn delete<'e, E, ID>(&self, executor: E, id: ID) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let id = id.into_uuid()?;
        let result = sqlx::query("DELETE FROM albums WHERE id = ?;")
            .bind(id.to_string())
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        if result.rows_affected() > 0 {
            Ok(())
        } else {
            Err(RepositoryError::IdNotFound(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_helpers::{prepare_db, TestSetupError};

    fn new_album(path: &str) -> Album {
        let now = Utc::now();
        Album::new(Uuid::new_v4(), PathBuf::from(path), None, None, None, AlbumStatus::Pending, now, now).unwrap()
    }

    #[tokio::test]
    async fn save_and_fetch_roundtrip() -> Result<(), TestSetupError> {
        let pool = prepare_db().await?;
        let repo = SqliteAlbumsRepository::new();
        let album = new_album("/music/Artist/Album");

        let saved = repo.save(&pool, &album).await?;
        assert_eq!(saved.id(), album.id());

        let fetched = repo.by_id_fetch(&pool, saved.id()).await?;
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().path(), album.path());

        Ok(())
    }

    #[tokio::test]
    async fn duplicate_path_rejected() -> Result<(), TestSetupError> {
        let pool = prepare_db().await?;
        let repo = SqliteAlbumsRepository::new();
        let album = new_album("/music/Artist/Album");
        repo.save(&pool, &album).await?;

        let dup = new_album("/music/Artist/Album");
        let result = repo.save(&pool, &dup).await;
        assert!(result.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn update_roundtrips_status_and_confidence() -> Result<(), TestSetupError> {
        let pool = prepare_db().await?;
        let repo = SqliteAlbumsRepository::new();
        let mut album = new_album("/music/Artist/Album2");
        repo.save(&pool, &album).await?;

        album.set_status(AlbumStatus::Tagged);
        album.set_match_confidence(Some(92.5));
        repo.update(&pool, &album).await?;

        let fetched = repo.by_id_fetch(&pool, album.id()).await?.unwrap();
        assert_eq!(fetched.status(), AlbumStatus::Tagged);
        assert_eq!(fetched.match_confidence(), Some(92.5));

        Ok(())
    }

    #[tokio::test]
    async fn all_by_status_filters() -> Result<(), TestSetupError> {
        let pool = prepare_db().await?;
        let repo = SqliteAlbumsRepository::new();
        let mut pending = new_album("/music/A/B");
        let mut tagged = new_album("/music/C/D");
        tagged.set_status(AlbumStatus::Tagged);

        repo.save(&pool, &pending).await?;
        repo.save(&pool, &tagged).await?;

        let pendings = repo.all_by_status(&pool, AlbumStatus::Pending).await?;
        assert_eq!(pendings.len(), 1);
        assert_eq!(pendings[0].id(), pending.id());

        Ok(())
    }
}

use std::{path::PathBuf, str::FromStr};

use chrono::NaiveDateTime;
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use crate::domain::{Track, TrackStatus, ValidationError};
use super::{IntoUuid, RepositoryError};

#[derive(FromRow)]
struct DbTrack {
    id: String,
    album_id: String,
    path: String,
    track_number: Option<i64>,
    disc_number: i64,
    title: Option<String>,
    artist: Option<String>,
    duration: Option<f64>,
    musicbrainz_recording_id: Option<String>,
    status: String,
    error_message: Option<String>,
    has_lyrics: i64,
    lyrics_synced: i64,
    replaygain_track_gain: Option<String>,
    replaygain_track_peak: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackConversionError {
    #[error("Uuid conversion error: {0}")]
    UuidConversion(#[from] uuid::Error),

    #[error("Unknown track status: {0}")]
    UnknownStatus(String),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl TryFrom<DbTrack> for Track {
    type Error = TrackConversionError;

    fn try_from(row: DbTrack) -> Result<Self, Self::Error> {
        let mut track = Track::new(
            Uuid::parse_str(&row.id)?,
            Uuid::parse_str(&row.album_id)?,
            PathBuf::from_str(&row.path).unwrap(),
            row.disc_number as i32,
            row.created_at.and_utc(),
            row.updated_at.and_utc(),
        )?;

        track.set_track_number(row.track_number.map(|n| n as i32));
        track.set_title(row.title);
        track.set_artist(row.artist);
        track.set_duration(row.duration);
        track.set_musicbrainz_recording_id(row.musicbrainz_recording_id);
        track.set_status(row.status.parse::<TrackStatus>().map_err(|_| TrackConversionError::UnknownStatus(row.status.clone()))?);
        track.set_error_message(row.error_message);
        track.set_lyrics_flags(row.has_lyrics != 0, row.lyrics_synced != 0);
        track.set_replaygain(row.replaygain_track_gain, row.replaygain_track_peak);

        Ok(track)
    }
}

pub struct SqliteTracksRepository;

impl SqliteTracksRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteTracksRepository {
    fn default() -> Self {
        Self::new()
    }
}

const TRACK_COLUMNS: &str = "id, album_id, path, track_number, disc_number, title, artist, duration, \
     musicbrainz_recording_id, status, error_message, has_lyrics, lyrics_synced, replaygain_track_gain, \
     replaygain_track_peak, created_at, updated_at";

impl SqliteTracksRepository {
    pub async fn save<'e, E>(&self, executor: E, track: &Track) -> Result<Track, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let path_str = track.path().to_string_lossy();
        let query = format!(
            "INSERT INTO tracks({TRACK_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?) RETURNING {TRACK_COLUMNS};"
        );

        let row = sqlx::query_as::<_, DbTrack>(&query)
            .bind(track.id().to_string())
            .bind(track.album_id().to_string())
            .bind(path_str.as_ref())
            .bind(track.track_number())
            .bind(track.disc_number() as i64)
            .bind(track.title())
            .bind(track.artist())
            .bind(track.duration())
            .bind(track.musicbrainz_recording_id())
            .bind(track.status().as_str())
            .bind(track.error_message())
            .bind(track.has_lyrics() as i64)
            .bind(track.lyrics_synced() as i64)
            .bind(track.replaygain_track_gain())
            .bind(track.replaygain_track_peak())
            .bind(track.created_at().naive_utc())
            .bind(track.updated_at().naive_utc())
            .fetch_one(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(row.try_into()?)
    }

    pub async fn update<'e, E>(&self, executor: E, track: &Track) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE tracks SET track_number = ?, disc_number = ?, title = ?, artist = ?, duration = ?, \
             musicbrainz_recording_id = ?, status = ?, error_message = ?, has_lyrics = ?, lyrics_synced = ?, \
             replaygain_track_gain = ?, replaygain_track_peak = ?, updated_at = ? WHERE id = ?;",
        )
        .bind(track.track_number())
        .bind(track.disc_number() as i64)
        .bind(track.title())
        .bind(track.artist())
        .bind(track.duration())
        .bind(track.musicbrainz_recording_id())
        .bind(track.status().as_str())
        .bind(track.error_message())
        .bind(track.has_lyrics() as i64)
        .bind(track.lyrics_synced() as i64)
        .bind(track.replaygain_track_gain())
        .bind(track.replaygain_track_peak())
        .bind(track.updated_at().naive_utc())
        .bind(track.id().to_string())
        .execute(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::IdNotFound(track.id()));
        }
        Ok(())
    }

    pub async fn by_id_fetch<'e, E, ID>(&self, executor: E, id: ID) -> Result<Option<Track>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let id = id.into_uuid()?;
        let row = sqlx::query_as::<_, DbTrack>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ? LIMIT 1;"))
            .bind(id.to_string())
            .fetch_optional(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        row.map(Track::try_from).transpose().map_err(RepositoryError::TrackDataMapping)
    }

    pub async fn by_path_fetch<'e, E>(&self, executor: E, path: &std::path::Path) -> Result<Option<Track>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let path_str = path.to_str().ok_or_else(|| RepositoryError::InvalidPathEncoding(path.to_path_buf()))?;
        let row = sqlx::query_as::<_, DbTrack>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE path = ? LIMIT 1;"))
            .bind(path_str)
            .fetch_optional(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        row.map(Track::try_from).transpose().map_err(RepositoryError::TrackDataMapping)
    }

    pub async fn all_by_album<'e, E, ID>(&self, executor: E, album_id: ID) -> Result<Vec<Track>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let album_id = album_id.into_uuid()?;
        let rows = sqlx::query_as::<_, DbTrack>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE album_id = ? ORDER BY disc_number, track_number;"
        ))
        .bind(album_id.to_string())
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        rows.into_iter().map(|r| Track::try_from(r).map_err(RepositoryError::TrackDataMapping)).collect()
    }

    pub async fn delete<'e, E, ID>(&self, executor: E, id: ID) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let id = id.into_uuid()?;
        let result = sqlx::query("DELETE FROM tracks WHERE id = ?;")
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

    pub async fn delete_by_path<'e, E>(&self, executor: E, path: &std::path::Path) -> Result<bool, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let path_str = path.to_str().ok_or_else(|| RepositoryError::InvalidPathEncoding(path.to_path_buf()))?;
        let result = sqlx::query("DELETE FROM tracks WHERE path = ?;")
            .bind(path_str)
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{Album, AlbumStatus};
    use crate::repository::{SqliteAlbumsRepository, test_helpers::{prepare_db, TestSetupError}};

    async fn seeded_album(pool: &sqlx::SqlitePool) -> Uuid {
        let now = Utc::now();
        let album = Album::new(Uuid::new_v4(), PathBuf::from("/music/A/B"), None, None, None, AlbumStatus::Pending, now, now).unwrap();
        SqliteAlbumsRepository::new().save(pool, &album).await.unwrap();
        album.id()
    }

    #[tokio::test]
    async fn save_and_fetch_roundtrip() -> Result<(), TestSetupError> {
        let pool = prepare_db().await?;
        let album_id = seeded_album(&pool).await;
        let repo = SqliteTracksRepository::new();
        let now = Utc::now();
        let track = Track::new(Uuid::new_v4(), album_id, PathBuf::from("/music/A/B/01.flac"), 1, now, now).unwrap();

        let saved = repo.save(&pool, &track).await?;
        assert_eq!(saved.album_id(), album_id);

        let fetched = repo.by_id_fetch(&pool, saved.id()).await?.unwrap();
        assert_eq!(fetched.path(), track.path());

        Ok(())
    }

    #[tokio::test]
    async fn all_by_album_orders_by_disc_then_track() -> Result<(), TestSetupError> {
        let pool = prepare_db().await?;
        let album_id = seeded_album(&pool).await;
        let repo = SqliteTracksRepository::new();
        let now = Utc::now();

        let mut t2 = Track::new(Uuid::new_v4(), album_id, PathBuf::from("/music/A/B/02.flac"), 1, now, now).unwrap();
        t2.set_track_number(Some(2));
        let mut t1 = Track::new(Uuid::new_v4(), album_id, PathBuf::from("/music/A/B/01.flac"), 1, now, now).unwrap();
        t1.set_track_number(Some(1));

        repo.save(&pool, &t2).await?;
        repo.save(&pool, &t1).await?;

        let tracks = repo.all_by_album(&pool, album_id).await?;
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].track_number(), Some(1));

        Ok(())
    }

    #[tokio::test]
    async fn cascade_delete_on_album_removal() -> Result<(), TestSetupError> {
        let pool = prepare_db().await?;
        let album_id = seeded_album(&pool).await;
        let repo = SqliteTracksRepository::new();
        let now = Utc::now();
        let track = Track::new(Uuid::new_v4(), album_id, PathBuf::from("/music/A/B/01.flac"), 1, now, now).unwrap();
        repo.save(&pool, &track).await?;

        SqliteAlbumsRepository::new().delete(&pool, album_id).await?;

        let fetched = repo.by_id_fetch(&pool, track.id()).await?;
        assert!(fetched.is_none());

        Ok(())
    }
}

use chrono::NaiveDateTime;
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use crate::domain::{MatchCandidate, ValidationError};
use super::{IntoUuid, RepositoryError};

#[derive(FromRow)]
struct DbMatchCandidate {
    id: String,
    album_id: String,
    musicbrainz_release_id: String,
    confidence: f64,
    artist: Option<String>,
    album: Option<String>,
    year: Option<i64>,
    original_year: Option<i64>,
    track_count: Option<i64>,
    country: Option<String>,
    media: Option<String>,
    label: Option<String>,
    barcode: Option<String>,
    is_selected: i64,
    created_at: NaiveDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum MatchCandidateConversionError {
    #[error("Uuid conversion error: {0}")]
    UuidConversion(#[from] uuid::Error),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl TryFrom<DbMatchCandidate> for MatchCandidate {
    type Error = MatchCandidateConversionError;

    fn try_from(row: DbMatchCandidate) -> Result<Self, Self::Error> {
        let mut candidate = MatchCandidate::new(
            Uuid::parse_str(&row.id)?,
            Uuid::parse_str(&row.album_id)?,
            row.musicbrainz_release_id,
            row.confidence,
            row.created_at.and_utc(),
        )?;

        candidate.set_artist(row.artist);
        candidate.set_album(row.album);
        candidate.set_year(row.year.map(|y| y as i32));
        candidate.set_original_year(row.original_year.map(|y| y as i32));
        candidate.set_track_count(row.track_count);
        candidate.set_country(row.country);
        candidate.set_media(row.media);
        candidate.set_label(row.label);
        candidate.set_barcode(row.barcode);
        candidate.set_selected(row.is_selected != 0);

        Ok(candidate)
    }
}

pub struct SqliteMatchCandidatesRepository;

impl SqliteMatchCandidatesRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteMatchCandidatesRepository {
    fn default() -> Self {
        Self::new()
    }
}

const CANDIDATE_COLUMNS: &str = "id, album_id, musicbrainz_release_id, confidence, artist, album, year, \
     original_year, track_count, country, media, label, barcode, is_selected, created_at";

impl SqliteMatchCandidatesRepository {
    pub async fn save<'e, E>(&self, executor: E, candidate: &MatchCandidate) -> Result<MatchCandidate, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let query = format!("INSERT INTO match_candidates({CANDIDATE_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?) RETURNING {CANDIDATE_COLUMNS};");

        let row = sqlx::query_as::<_, DbMatchCandidate>(&query)
            .bind(candidate.id().to_string())
            .bind(candidate.album_id().to_string())
            .bind(candidate.musicbrainz_release_id())
            .bind(candidate.confidence())
            .bind(candidate.artist())
            .bind(candidate.album())
            .bind(candidate.year().map(|y| y as i64))
            .bind(candidate.original_year().map(|y| y as i64))
            .bind(candidate.track_count())
            .bind(candidate.country())
            .bind(candidate.media())
            .bind(candidate.label())
            .bind(candidate.barcode())
            .bind(candidate.is_selected() as i64)
            .bind(candidate.created_at().naive_utc())
            .fetch_one(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(row.try_into()?)
    }

    pub async fn all_by_album<'e, E, ID>(&self, executor: E, album_id: ID) -> Result<Vec<MatchCandidate>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
        ID: IntoUuid + Send + Sync,
    {
        let album_id = album_id.into_uuid()?;
        let rows = sqlx::query_as::<_, DbMatchCandidate>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM match_candidates WHERE album_id = ? ORDER BY confidence DESC;"
        ))
        .bind(album_id.to_string())
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        rows.into_iter().map(|r| MatchCandidate::try_from(r).map_err(RepositoryError::MatchCandidateDataMapping)).collect()
    }

    /// Clears previous candidates before the Matcher inserts a fresh top-N
    /// list; it recomputes the whole set on every match attempt rather than
    /// patching it incrementally. Callers pass a `&mut Transaction` as the
    /// executor so the clear and the following `save` calls stay atomic.
    pub async fn clear_for_album<'e, E>(&self, executor: E, album_id: Uuid) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("DELETE FROM match_candidates WHERE album_id = ?;")
            .bind(album_id.to_string())
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn mark_selected<'e, E>(&self, executor: E, album_id: Uuid, candidate_id: Uuid) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE match_candidates SET is_selected = (id = ?) WHERE album_id = ?;")
            .bind(candidate_id.to_string())
            .bind(album_id.to_string())
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;
        Ok(())
    }
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationError;

/// Lifecycle state of an Album, per the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumStatus {
    Pending,
    Matching,
    NeedsReview,
    Tagged,
    Skipped,
    Failed,
}

impl AlbumStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumStatus::Pending => "pending",
            AlbumStatus::Matching => "matching",
            AlbumStatus::NeedsReview => "needs_review",
            AlbumStatus::Tagged => "tagged",
            AlbumStatus::Skipped => "skipped",
            AlbumStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlbumStatus::NeedsReview | AlbumStatus::Skipped)
    }
}

impl std::str::FromStr for AlbumStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => AlbumStatus::Pending,
            "matching" => AlbumStatus::Matching,
            "needs_review" => AlbumStatus::NeedsReview,
            "tagged" => AlbumStatus::Tagged,
            "skipped" => AlbumStatus::Skipped,
            "failed" => AlbumStatus::Failed,
            _ => return Err(ValidationError::NameIsEmptyString),
        })
    }
}

/// A directory on disk the Scanner/Audio Folder Reader has classified as an album.
#[derive(Debug, Clone)]
pub struct Album {
    id: Uuid,
    path: PathBuf,
    artist: Option<String>,
    album: Option<String>,
    year: Option<i32>,
    status: AlbumStatus,
    match_confidence: Option<f64>,
    musicbrainz_release_id: Option<String>,
    musicbrainz_release_group_id: Option<String>,
    cover_path: Option<PathBuf>,
    cover_url: Option<String>,
    track_count: Option<i64>,
    error_message: Option<String>,
    retry_count: u32,
    replaygain_album_gain: Option<String>,
    replaygain_album_peak: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AsRef<Album> for Album {
    fn as_ref(&self) -> &Album {
        self
    }
}

impl PartialEq for Album {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Album {}

#[allow(clippy::too_many_arguments)]
impl Album {
    pub fn new(
        id: Uuid,
        path: PathBuf,
        artist: Option<String>,
        album: Option<String>,
        year: Option<i32>,
        status: AlbumStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if path.as_os_str().is_empty() {
            return Err(ValidationError::PathIsEmptyString);
        }

        Ok(Self {
            id,
            path,
            artist,
            album,
            year,
            status,
            match_confidence: None,
            musicbrainz_release_id: None,
            musicbrainz_release_group_id: None,
            cover_path: None,
            cover_url: None,
            track_count: None,
            error_message: None,
            retry_count: 0,
            replaygain_album_gain: None,
            replaygain_album_peak: None,
            created_at,
            updated_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn set_artist(&mut self, artist: Option<String>) {
        self.artist = artist;
    }

    pub fn album(&self) -> Option<&str> {
        self.album.as_deref()
    }

    pub fn set_album(&mut self, album: Option<String>) {
        self.album = album;
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn set_year(&mut self, year: Option<i32>) {
        self.year = year;
    }

    pub fn status(&self) -> AlbumStatus {
        self.status
    }

    pub fn set_status(&mut self, status: AlbumStatus) {
        self.status = status;
    }

    pub fn match_confidence(&self) -> Option<f64> {
        self.match_confidence
    }

    pub fn set_match_confidence(&mut self, confidence: Option<f64>) {
        self.match_confidence = confidence;
    }

    pub fn musicbrainz_release_id(&self) -> Option<&str> {
        self.musicbrainz_release_id.as_deref()
    }

    pub fn set_musicbrainz_release_id(&mut self, id: Option<String>) {
        self.musicbrainz_release_id = id;
    }

    pub fn musicbrainz_release_group_id(&self) -> Option<&str> {
        self.musicbrainz_release_group_id.as_deref()
    }

    pub fn set_musicbrainz_release_group_id(&mut self, id: Option<String>) {
        self.musicbrainz_release_group_id = id;
    }

    pub fn cover_path(&self) -> Option<&PathBuf> {
        self.cover_path.as_ref()
    }

    pub fn set_cover_path(&mut self, path: Option<PathBuf>) {
        self.cover_path = path;
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.cover_url.as_deref()
    }

    pub fn set_cover_url(&mut self, url: Option<String>) {
        self.cover_url = url;
    }

    pub fn track_count(&self) -> Option<i64> {
        self.track_count
    }

    pub fn set_track_count(&mut self, count: Option<i64>) {
        self.track_count = count;
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_error_message(&mut self, message: Option<String>) {
        self.error_message = message;
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn increment_retry_count(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub fn reset_retry_count(&mut self) {
        self.retry_count = 0;
    }

    pub fn replaygain_album_gain(&self) -> Option<&str> {
        self.replaygain_album_gain.as_deref()
    }

    pub fn set_replaygain(&mut self, gain: Option<String>, peak: Option<String>) {
        self.replaygain_album_gain = gain;
        self.replaygain_album_peak = peak;
    }

    pub fn replaygain_album_peak(&self) -> Option<&str> {
        self.replaygain_album_peak.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

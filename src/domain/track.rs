use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Pending,
    Tagged,
    Failed,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Pending => "pending",
            TrackStatus::Tagged => "tagged",
            TrackStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TrackStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => TrackStatus::Pending,
            "tagged" => TrackStatus::Tagged,
            "failed" => TrackStatus::Failed,
            _ => return Err(ValidationError::PathIsEmptyString),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    id: Uuid,
    album_id: Uuid,
    path: PathBuf,
    track_number: Option<i32>,
    disc_number: i32,
    title: Option<String>,
    artist: Option<String>,
    duration: Option<f64>,
    musicbrainz_recording_id: Option<String>,
    status: TrackStatus,
    error_message: Option<String>,
    has_lyrics: bool,
    lyrics_synced: bool,
    replaygain_track_gain: Option<String>,
    replaygain_track_peak: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AsRef<Track> for Track {
    fn as_ref(&self) -> &Track {
        self
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Track {}

#[allow(clippy::too_many_arguments)]
impl Track {
    pub fn new(
        id: Uuid,
        album_id: Uuid,
        path: PathBuf,
        disc_number: i32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if path.as_os_str().is_empty() {
            return Err(ValidationError::PathIsEmptyString);
        }
        if disc_number < 1 {
            return Err(ValidationError::DiscNumberIsZero);
        }

        Ok(Self {
            id,
            album_id,
            path,
            track_number: None,
            disc_number,
            title: None,
            artist: None,
            duration: None,
            musicbrainz_recording_id: None,
            status: TrackStatus::Pending,
            error_message: None,
            has_lyrics: false,
            lyrics_synced: false,
            replaygain_track_gain: None,
            replaygain_track_peak: None,
            created_at,
            updated_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn album_id(&self) -> Uuid {
        self.album_id
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn track_number(&self) -> Option<i32> {
        self.track_number
    }

    pub fn set_track_number(&mut self, n: Option<i32>) {
        self.track_number = n;
    }

    pub fn disc_number(&self) -> i32 {
        self.disc_number
    }

    pub fn set_disc_number(&mut self, n: i32) {
        self.disc_number = n;
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title;
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn set_artist(&mut self, artist: Option<String>) {
        self.artist = artist;
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration;
    }

    pub fn musicbrainz_recording_id(&self) -> Option<&str> {
        self.musicbrainz_recording_id.as_deref()
    }

    pub fn set_musicbrainz_recording_id(&mut self, id: Option<String>) {
        self.musicbrainz_recording_id = id;
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn set_status(&mut self, status: TrackStatus) {
        self.status = status;
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_error_message(&mut self, message: Option<String>) {
        self.error_message = message;
    }

    pub fn has_lyrics(&self) -> bool {
        self.has_lyrics
    }

    pub fn lyrics_synced(&self) -> bool {
        self.lyrics_synced
    }

    pub fn set_lyrics_flags(&mut self, has_lyrics: bool, synced: bool) {
        self.has_lyrics = has_lyrics;
        self.lyrics_synced = synced;
    }

    pub fn replaygain_track_gain(&self) -> Option<&str> {
        self.replaygain_track_gain.as_deref()
    }

    pub fn replaygain_track_peak(&self) -> Option<&str> {
        self.replaygain_track_peak.as_deref()
    }

    pub fn set_replaygain(&mut self, gain: Option<String>, peak: Option<String>) {
        self.replaygain_track_gain = gain;
        self.replaygain_track_peak = peak;
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

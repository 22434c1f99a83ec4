use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ValidationError;

/// A scored MusicBrainz release considered for an Album, per the Matcher (C5).
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    id: Uuid,
    album_id: Uuid,
    musicbrainz_release_id: String,
    confidence: f64,
    artist: Option<String>,
    album: Option<String>,
    year: Option<i32>,
    original_year: Option<i32>,
    track_count: Option<i64>,
    country: Option<String>,
    media: Option<String>,
    label: Option<String>,
    barcode: Option<String>,
    is_selected: bool,
    created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
impl MatchCandidate {
    pub fn new(
        id: Uuid,
        album_id: Uuid,
        musicbrainz_release_id: String,
        confidence: f64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if musicbrainz_release_id.is_empty() {
            return Err(ValidationError::NameIsEmptyString);
        }
        if !(0.0..=100.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence));
        }

        Ok(Self {
            id,
            album_id,
            musicbrainz_release_id,
            confidence,
            artist: None,
            album: None,
            year: None,
            original_year: None,
            track_count: None,
            country: None,
            media: None,
            label: None,
            barcode: None,
            is_selected: false,
            created_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn album_id(&self) -> Uuid {
        self.album_id
    }

    pub fn musicbrainz_release_id(&self) -> &str {
        &self.musicbrainz_release_id
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn set_artist(&mut self, v: Option<String>) {
        self.artist = v;
    }

    pub fn album(&self) -> Option<&str> {
        self.album.as_deref()
    }

    pub fn set_album(&mut self, v: Option<String>) {
        self.album = v;
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn set_year(&mut self, v: Option<i32>) {
        self.year = v;
    }

    pub fn original_year(&self) -> Option<i32> {
        self.original_year
    }

    pub fn set_original_year(&mut self, v: Option<i32>) {
        self.original_year = v;
    }

    pub fn track_count(&self) -> Option<i64> {
        self.track_count
    }

    pub fn set_track_count(&mut self, v: Option<i64>) {
        self.track_count = v;
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn set_country(&mut self, v: Option<String>) {
        self.country = v;
    }

    pub fn media(&self) -> Option<&str> {
        self.media.as_deref()
    }

    pub fn set_media(&mut self, v: Option<String>) {
        self.media = v;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, v: Option<String>) {
        self.label = v;
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref()
    }

    pub fn set_barcode(&mut self, v: Option<String>) {
        self.barcode = v;
    }

    pub fn is_selected(&self) -> bool {
        self.is_selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.is_selected = selected;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What triggered a backup snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupAction {
    MusicbrainzTag,
    ManualEdit,
    Artwork,
    Lyrics,
    Replaygain,
    PreRestore,
}

impl BackupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupAction::MusicbrainzTag => "musicbrainz_tag",
            BackupAction::ManualEdit => "manual_edit",
            BackupAction::Artwork => "artwork",
            BackupAction::Lyrics => "lyrics",
            BackupAction::Replaygain => "replaygain",
            BackupAction::PreRestore => "pre_restore",
        }
    }
}

impl std::str::FromStr for BackupAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "musicbrainz_tag" => BackupAction::MusicbrainzTag,
            "manual_edit" => BackupAction::ManualEdit,
            "artwork" => BackupAction::Artwork,
            "lyrics" => BackupAction::Lyrics,
            "replaygain" => BackupAction::Replaygain,
            "pre_restore" => BackupAction::PreRestore,
            other => return Err(format!("unknown backup action: {other}")),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TagBackup {
    id: Uuid,
    album_id: Uuid,
    action: BackupAction,
    created_at: DateTime<Utc>,
}

impl TagBackup {
    pub fn new(id: Uuid, album_id: Uuid, action: BackupAction, created_at: DateTime<Utc>) -> Self {
        Self { id, album_id, action, created_at }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn album_id(&self) -> Uuid {
        self.album_id
    }

    pub fn action(&self) -> BackupAction {
        self.action
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// One track's tag state at backup time. `tags_json` holds every field the
/// Tag Codec (C1) round-trips except the cover, which is shared per-backup
/// on disk (see core::backup).
#[derive(Debug, Clone)]
pub struct TrackTagSnapshot {
    id: Uuid,
    backup_id: Uuid,
    track_id: Uuid,
    path: PathBuf,
    tags_json: String,
    has_cover: bool,
    cover_path: Option<PathBuf>,
}

impl TrackTagSnapshot {
    pub fn new(
        id: Uuid,
        backup_id: Uuid,
        track_id: Uuid,
        path: PathBuf,
        tags_json: String,
        has_cover: bool,
        cover_path: Option<PathBuf>,
    ) -> Self {
        Self { id, backup_id, track_id, path, tags_json, has_cover, cover_path }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn backup_id(&self) -> Uuid {
        self.backup_id
    }

    pub fn track_id(&self) -> Uuid {
        self.track_id
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn tags_json(&self) -> &str {
        &self.tags_json
    }

    pub fn has_cover(&self) -> bool {
        self.has_cover
    }

    pub fn cover_path(&self) -> Option<&PathBuf> {
        self.cover_path.as_ref()
    }
}

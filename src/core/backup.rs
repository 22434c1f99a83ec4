use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::core::tag_codec::{self, TagRecord};
use crate::core::CoreError;
use crate::domain::{BackupAction, TagBackup, Track, TrackTagSnapshot};
use crate::repository::{RepositoryError, SqliteTagBackupsRepository, SqliteTracksRepository};

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Codec(#[from] CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("backup {0} has no snapshots")]
    EmptyBackup(Uuid),
}

/// Everything `TagRecord` carries except the cover payload, which is stored
/// once per backup on disk rather than duplicated per track.
#[derive(Debug, Serialize, Deserialize)]
struct SerializedTags {
    title: Option<String>,
    artist: Option<String>,
    album_artist: Option<String>,
    album: Option<String>,
    track_number: Option<u32>,
    track_total: Option<u32>,
    disc_number: Option<u32>,
    disc_total: Option<u32>,
    year: Option<u32>,
    genre: Option<String>,
    label: Option<String>,
    country: Option<String>,
    release_id: Option<String>,
    recording_id: Option<String>,
}

impl From<&TagRecord> for SerializedTags {
    fn from(r: &TagRecord) -> Self {
        Self {
            title: r.title.clone(),
            artist: r.artist.clone(),
            album_artist: r.album_artist.clone(),
            album: r.album.clone(),
            track_number: r.track_number,
            track_total: r.track_total,
            disc_number: r.disc_number,
            disc_total: r.disc_total,
            year: r.year,
            genre: r.genre.clone(),
            label: r.label.clone(),
            country: r.country.clone(),
            release_id: r.release_id.clone(),
            recording_id: r.recording_id.clone(),
        }
    }
}

impl SerializedTags {
    /// Rehydrates into a `TagRecord` with every field set (cover left for
    /// the caller to attach separately) so it can be merged over a fresh
    /// read of the file during restore.
    fn into_record(self) -> TagRecord {
        TagRecord {
            title: self.title,
            artist: self.artist,
            album_artist: self.album_artist,
            album: self.album,
            track_number: self.track_number,
            track_total: self.track_total,
            disc_number: self.disc_number,
            disc_total: self.disc_total,
            year: self.year,
            genre: self.genre,
            label: self.label,
            country: self.country,
            release_id: self.release_id,
            recording_id: self.recording_id,
            cover_data: None,
            cover_mime: None,
        }
    }
}

/// Owns the on-disk backup directory tree (`<root>/<backup_id>/cover.*`)
/// exclusively; the DB rows are the other half of a backup's identity.
pub struct BackupStore {
    root: PathBuf,
    backups_repo: SqliteTagBackupsRepository,
    tracks_repo: SqliteTracksRepository,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backups_repo: SqliteTagBackupsRepository::new(),
            tracks_repo: SqliteTracksRepository::new(),
        }
    }

    fn backup_dir(&self, backup_id: Uuid) -> PathBuf {
        self.root.join(backup_id.to_string())
    }

    /// Captures the current tag state of every track in `tracks` under one
    /// backup row. The cover (taken from the first track that has one) is
    /// written once, shared by the whole backup. Blocking tag reads and
    /// file I/O; call from a blocking context.
    pub fn create_backup(&self, pool: &SqlitePool, album_id: Uuid, action: BackupAction, tracks: &[Track]) -> Result<TagBackup, BackupError> {
        let backup_id = Uuid::new_v4();
        let backup = TagBackup::new(backup_id, album_id, action, Utc::now());

        let mut shared_cover: Option<(Vec<u8>, String)> = None;
        let mut snapshots = Vec::with_capacity(tracks.len());

        for track in tracks {
            let record = match tag_codec::read_tags(track.path()) {
                Ok(record) => record,
                Err(err) => {
                    log::warn!("Backup: failed to read tags for {}: {err}", track.path().display());
                    continue;
                }
            };

            let has_cover = record.cover_data.is_some();
            if has_cover && shared_cover.is_none() {
                if let (Some(data), Some(mime)) = (&record.cover_data, &record.cover_mime) {
                    shared_cover = Some((data.clone(), mime.clone()));
                }
            }

            let tags_json = serde_json::to_string(&SerializedTags::from(&record))?;
            let cover_path = has_cover.then(|| self.cover_path_for(backup_id, record.cover_mime.as_deref()));

            snapshots.push(TrackTagSnapshot::new(
                Uuid::new_v4(),
                backup_id,
                track.id(),
                track.path().clone(),
                tags_json,
                has_cover,
                cover_path,
            ));
        }

        if let Some((data, mime)) = &shared_cover {
            let dir = self.backup_dir(backup_id);
            std::fs::create_dir_all(&dir)?;
            std::fs::write(self.cover_path_for(backup_id, Some(mime)), data)?;
        }

        futures::executor::block_on(async {
            let mut tx = pool.begin().await.map_err(RepositoryError::from_sqlx_error)?;
            self.backups_repo.create_backup(&mut *tx, &backup).await?;
            for snapshot in &snapshots {
                self.backups_repo.add_snapshot(&mut *tx, snapshot).await?;
            }
            tx.commit().await.map_err(RepositoryError::from_sqlx_error)?;
            Ok::<_, BackupError>(())
        })?;

        log::info!("Created backup {backup_id} for album {album_id} ({} action, {} tracks)", backup.action().as_str(), snapshots.len());
        Ok(backup)
    }

    fn cover_path_for(&self, backup_id: Uuid, mime: Option<&str>) -> PathBuf {
        let ext = if mime == Some("image/png") { "png" } else { "jpg" };
        self.backup_dir(backup_id).join(format!("cover.{ext}"))
    }

    /// Restores every snapshot in `backup_id`: reads the snapshot's tags,
    /// rehydrates the shared cover from disk, merges over a fresh read of
    /// the file (read-merge-write, so untouched fields survive), writes,
    /// and updates the Track row's cached columns.
    pub fn restore_backup(&self, pool: &SqlitePool, backup_id: Uuid) -> Result<usize, BackupError> {
        let snapshots = futures::executor::block_on(self.backups_repo.snapshots_by_backup(pool, backup_id))?;
        if snapshots.is_empty() {
            return Err(BackupError::EmptyBackup(backup_id));
        }

        let mut restored = 0usize;
        for snapshot in &snapshots {
            let stored: SerializedTags = serde_json::from_str(snapshot.tags_json())?;
            let mut record = stored.into_record();

            if snapshot.has_cover() {
                if let Some(cover_path) = snapshot.cover_path() {
                    match std::fs::read(cover_path) {
                        Ok(data) => {
                            let mime = crate::core::artwork::mime_from_bytes(&data).to_string();
                            record = record.with_cover(data, mime);
                        }
                        Err(err) => log::warn!("Backup {backup_id}: cover {} missing or unreadable: {err}", cover_path.display()),
                    }
                }
            }

            // Merge current fields over a fresh read so fields the backup
            // never captured (e.g. written after the backup) are preserved.
            let current = tag_codec::read_tags(snapshot.path()).unwrap_or_default();
            let merged = merge_over(record, current);

            match tag_codec::write_tags(snapshot.path(), &merged) {
                Ok(true) => {
                    restored += 1;
                    futures::executor::block_on(async {
                        if let Some(mut track) = self.tracks_repo.by_id_fetch(pool, snapshot.track_id()).await? {
                            track.set_title(merged.title.clone());
                            track.set_artist(merged.artist.clone());
                            track.set_track_number(merged.track_number.map(|n| n as i32));
                            track.set_disc_number(merged.disc_number.unwrap_or(1) as i32);
                            track.set_musicbrainz_recording_id(merged.recording_id.clone());
                            track.set_status(crate::domain::track::TrackStatus::Tagged);
                            track.set_error_message(None);
                            track.touch(Utc::now());
                            self.tracks_repo.update(pool, &track).await?;
                        }
                        Ok::<_, RepositoryError>(())
                    })?;
                }
                Ok(false) => log::warn!("Backup {backup_id}: write failed for {}", snapshot.path().display()),
                Err(err) => log::warn!("Backup {backup_id}: write errored for {}: {err}", snapshot.path().display()),
            }
        }

        log::info!("Restored backup {backup_id}: {restored}/{} tracks", snapshots.len());
        Ok(restored)
    }

    /// Keeps the most recent `keep` backups for `album_id`; deletes the
    /// rest. Directory removed before the row: a row surviving a failed
    /// directory delete is reconcilable by re-running prune; a directory
    /// surviving a failed row delete is not, since nothing else references it.
    pub fn prune(&self, pool: &SqlitePool, album_id: Uuid, keep: i64) -> Result<usize, BackupError> {
        let doomed = futures::executor::block_on(self.backups_repo.prune(pool, album_id, keep))?;
        let mut removed = 0usize;
        for backup in &doomed {
            let dir = self.backup_dir(backup.id());
            if dir.exists() {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    log::warn!("Prune: failed to remove backup dir {}: {err}", dir.display());
                    continue;
                }
            }
            futures::executor::block_on(self.backups_repo.delete(pool, backup.id()))?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Overlays `preferred` over `fallback`: every `Some` field in `preferred`
/// wins, `None` falls back. Cover always comes from `preferred` (the
/// backup/record being restored), never merged field-by-field.
fn merge_over(preferred: TagRecord, fallback: TagRecord) -> TagRecord {
    TagRecord {
        title: preferred.title.or(fallback.title),
        artist: preferred.artist.or(fallback.artist),
        album_artist: preferred.album_artist.or(fallback.album_artist),
        album: preferred.album.or(fallback.album),
        track_number: preferred.track_number.or(fallback.track_number),
        track_total: preferred.track_total.or(fallback.track_total),
        disc_number: preferred.disc_number.or(fallback.disc_number),
        disc_total: preferred.disc_total.or(fallback.disc_total),
        year: preferred.year.or(fallback.year),
        genre: preferred.genre.or(fallback.genre),
        label: preferred.label.or(fallback.label),
        country: preferred.country.or(fallback.country),
        release_id: preferred.release_id.or(fallback.release_id),
        recording_id: preferred.recording_id.or(fallback.recording_id),
        cover_data: preferred.cover_data.or(fallback.cover_data),
        cover_mime: preferred.cover_mime.or(fallback.cover_mime),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_tags_roundtrip_preserves_fields() {
        let record = TagRecord {
            title: Some("Money".into()),
            artist: Some("Pink Floyd".into()),
            track_number: Some(6),
            ..Default::default()
        };
        let serialized = SerializedTags::from(&record);
        let json = serde_json::to_string(&serialized).unwrap();
        let back: SerializedTags = serde_json::from_str(&json).unwrap();
        let rebuilt = back.into_record();
        assert_eq!(rebuilt.title, record.title);
        assert_eq!(rebuilt.artist, record.artist);
        assert_eq!(rebuilt.track_number, record.track_number);
        assert!(rebuilt.cover_data.is_none());
    }

    #[test]
    fn merge_over_prefers_preferred_but_falls_back() {
        let preferred = TagRecord { title: Some("A".into()), ..Default::default() };
        let fallback = TagRecord { title: Some("B".into()), artist: Some("Fallback Artist".into()), ..Default::default() };
        let merged = merge_over(preferred, fallback);
        assert_eq!(merged.title.as_deref(), Some("A"));
        assert_eq!(merged.artist.as_deref(), Some("Fallback Artist"));
    }
}

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::core::audio_reader::{self, AlbumInfo, DiscPatternSet};
use crate::core::queue::WorkQueue;
use crate::domain::{Album, ActivityLogEntry, AlbumStatus, ReconcileReport, Track, ValidationError};
use crate::repository::{RepositoryError, SqliteAlbumsRepository, SqliteActivityLogRepository, SqliteTracksRepository};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Walks the library root and reconciles what it finds against the
/// persistent album index. Holds no queue state of its own beyond the
/// repositories it was built with; one `Scanner` is reused across every
/// scan.
pub struct Scanner {
    albums_repo: SqliteAlbumsRepository,
    tracks_repo: SqliteTracksRepository,
    activity_repo: SqliteActivityLogRepository,
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            albums_repo: SqliteAlbumsRepository::new(),
            tracks_repo: SqliteTracksRepository::new(),
            activity_repo: SqliteActivityLogRepository::new(),
        }
    }

    /// `scanDirectory(root, force)`. Two-level traversal shared with the
    /// Watcher; each discovered folder is inserted, incrementally
    /// reconciled, or fully replaced depending on whether it is already
    /// known and whether `force` was requested. New albums are auto-queued
    /// for matching with `userInitiated=false`.
    pub async fn scan_directory(&self, pool: &SqlitePool, root: &Path, force: bool, patterns: &DiscPatternSet, queue: &WorkQueue) -> Result<ReconcileReport, ScanError> {
        let mut report = ReconcileReport::new();
        let discovered = audio_reader::discover_album_folders(root, patterns);
        let discovered_set: HashSet<PathBuf> = discovered.iter().cloned().collect();

        self.remove_subsumed_per_disc_albums(pool, &discovered_set, &mut report).await?;

        for path in discovered {
            let Some(info) = self.read_album_folder(&path, patterns) else {
                continue;
            };

            match self.albums_repo.by_path_fetch(pool, &path).await? {
                None => self.insert_album(pool, &path, &info, queue, &mut report).await?,
                Some(album) if force => self.replace_album(pool, album, &info, queue, &mut report).await?,
                Some(album) => self.reconcile_album(pool, album, &info, &mut report).await?,
            }
        }

        Ok(report)
    }

    /// Reconciles exactly one already-identified album folder, skipping the
    /// root-wide `discover_album_folders` walk and the per-disc-subsumption
    /// sweep. Used by the Orchestrator when handling a `FolderScanAndTag`
    /// item raised by the Watcher, which already knows the folder in
    /// question rather than a library root to rediscover from scratch.
    pub async fn scan_single_folder(&self, pool: &SqlitePool, path: &Path, patterns: &DiscPatternSet, queue: &WorkQueue) -> Result<ReconcileReport, ScanError> {
        let mut report = ReconcileReport::new();

        let Some(info) = self.read_album_folder(path, patterns) else {
            return Ok(report);
        };

        match self.albums_repo.by_path_fetch(pool, path).await? {
            None => self.insert_album(pool, path, &info, queue, &mut report).await?,
            Some(album) => self.reconcile_album(pool, album, &info, &mut report).await?,
        }

        Ok(report)
    }

    fn read_album_folder(&self, path: &Path, patterns: &DiscPatternSet) -> Option<AlbumInfo> {
        match audio_reader::classify_folder(path, patterns) {
            audio_reader::FolderKind::Flat => audio_reader::scan_album_folder(path),
            audio_reader::FolderKind::MultiDisc(discs) => audio_reader::scan_multi_disc_album(path, &discs),
            audio_reader::FolderKind::NonAlbum => None,
        }
    }

    async fn insert_album(&self, pool: &SqlitePool, path: &Path, info: &AlbumInfo, queue: &WorkQueue, report: &mut ReconcileReport) -> Result<(), ScanError> {
        if info.tracks.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut album = Album::new(Uuid::new_v4(), path.to_path_buf(), info.artist.clone(), info.album.clone(), info.year.map(|y| y as i32), AlbumStatus::Pending, now, now)?;
        album.set_track_count(Some(info.tracks.len() as i64));
        let saved = self.albums_repo.save(pool, &album).await?;

        for track_info in &info.tracks {
            let mut track = Track::new(Uuid::new_v4(), saved.id(), track_info.path.clone(), track_info.disc_number.unwrap_or(1) as i32, now, now)?;
            track.set_track_number(track_info.track_number.map(|n| n as i32));
            track.set_title(track_info.title.clone());
            track.set_artist(track_info.artist.clone());
            track.set_duration(track_info.duration);
            self.tracks_repo.save(pool, &track).await?;
        }

        self.activity_repo.record(pool, &ActivityLogEntry::new(Uuid::new_v4(), Some(saved.id()), "scanned".to_string(), now)).await?;
        queue.enqueue_album(saved.id(), None, false);
        report.added.push(saved.id());
        log::info!("Scanner: discovered new album {} ({})", saved.path().display(), info.tracks.len());
        Ok(())
    }

    async fn replace_album(&self, pool: &SqlitePool, album: Album, info: &AlbumInfo, queue: &WorkQueue, report: &mut ReconcileReport) -> Result<(), ScanError> {
        let path = album.path().clone();
        self.albums_repo.delete(pool, album.id()).await?;
        report.removed.push(album.id());
        self.insert_album(pool, &path, info, queue, report).await
    }

    /// Diffs on-disk track paths against persisted rows: adds new, deletes
    /// missing, bumps `trackCount` and resets status to `pending` on any
    /// change. Logs "incremental_update" only when something actually
    /// changed; an unchanged folder re-scanned produces zero writes.
    async fn reconcile_album(&self, pool: &SqlitePool, mut album: Album, info: &AlbumInfo, report: &mut ReconcileReport) -> Result<(), ScanError> {
        let persisted = self.tracks_repo.all_by_album(pool, album.id()).await?;
        let persisted_paths: HashSet<PathBuf> = persisted.iter().map(|t| t.path().clone()).collect();
        let on_disk_paths: HashSet<PathBuf> = info.tracks.iter().map(|t| t.path.clone()).collect();

        let mut changed = false;
        let now = Utc::now();

        for missing in persisted_paths.difference(&on_disk_paths) {
            self.tracks_repo.delete_by_path(pool, missing).await?;
            changed = true;
        }

        for track_info in info.tracks.iter().filter(|t| !persisted_paths.contains(&t.path)) {
            let mut track = Track::new(Uuid::new_v4(), album.id(), track_info.path.clone(), track_info.disc_number.unwrap_or(1) as i32, now, now)?;
            track.set_track_number(track_info.track_number.map(|n| n as i32));
            track.set_title(track_info.title.clone());
            track.set_artist(track_info.artist.clone());
            track.set_duration(track_info.duration);
            self.tracks_repo.save(pool, &track).await?;
            changed = true;
        }

        if changed {
            album.set_track_count(Some(info.tracks.len() as i64));
            album.set_status(AlbumStatus::Pending);
            album.touch(now);
            self.albums_repo.update(pool, &album).await?;
            self.activity_repo.record(pool, &ActivityLogEntry::new(Uuid::new_v4(), Some(album.id()), "incremental_update".to_string(), now)).await?;
            report.updated.push(album.id());
            log::info!("Scanner: reconciled {} ({} tracks now)", album.path().display(), info.tracks.len());
        }

        Ok(())
    }

    /// A folder previously tracked as its own per-disc Album is now covered
    /// by a multi-disc parent among `discovered`; remove the stale
    /// per-disc row before the parent is inserted.
    async fn remove_subsumed_per_disc_albums(&self, pool: &SqlitePool, discovered: &HashSet<PathBuf>, report: &mut ReconcileReport) -> Result<(), ScanError> {
        for album in self.albums_repo.all(pool).await? {
            if discovered.contains(album.path()) {
                continue;
            }
            let is_subsumed = discovered.iter().any(|parent| album.path().starts_with(parent) && album.path() != parent);
            if is_subsumed {
                log::info!("Scanner: removing per-disc album {} subsumed by multi-disc parent", album.path().display());
                self.albums_repo.delete(pool, album.id()).await?;
                report.removed.push(album.id());
            }
        }
        Ok(())
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    async fn prepare_db() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().max_connections(5).connect("sqlite::memory:").await.unwrap();
        sqlx::query("PRAGMA foreign_keys = ON;").execute(&pool).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    /// A minimal but structurally valid FLAC file: stream marker plus a
    /// single STREAMINFO block and no audio frames. `read_track` needs this
    /// to actually parse (unlike the Watcher's tests, the Scanner reads
    /// tags/properties, not just file extensions), so arbitrary bytes won't do.
    fn write_fake_audio(path: &Path) {
        #[rustfmt::skip]
        let bytes: &[u8] = &[
            b'f', b'L', b'a', b'C',
            0x80, 0x00, 0x00, 0x22,
            0x10, 0x00,
            0x10, 0x00,
            0x00, 0x00, 0x00,
            0x00, 0x00, 0x00,
            0x0A, 0xC4, 0x42, 0xF0, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn second_scan_over_unchanged_tree_is_a_no_op() {
        let pool = prepare_db().await;
        let dir = tempdir().unwrap();
        let album_dir = dir.path().join("Artist - Album");
        fs::create_dir_all(&album_dir).unwrap();
        write_fake_audio(&album_dir.join("01.flac"));

        let patterns = DiscPatternSet::compile(&[], 0);
        let (queue, _worker) = WorkQueue::new();
        let scanner = Scanner::new();

        let first = scanner.scan_directory(&pool, dir.path(), false, &patterns, &queue).await.unwrap();
        assert_eq!(first.added.len(), 1);

        let second = scanner.scan_directory(&pool, dir.path(), false, &patterns, &queue).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn new_track_triggers_incremental_update() {
        let pool = prepare_db().await;
        let dir = tempdir().unwrap();
        let album_dir = dir.path().join("Artist - Album");
        fs::create_dir_all(&album_dir).unwrap();
        write_fake_audio(&album_dir.join("01.flac"));

        let patterns = DiscPatternSet::compile(&[], 0);
        let (queue, _worker) = WorkQueue::new();
        let scanner = Scanner::new();
        scanner.scan_directory(&pool, dir.path(), false, &patterns, &queue).await.unwrap();

        write_fake_audio(&album_dir.join("02.flac"));
        let report = scanner.scan_directory(&pool, dir.path(), false, &patterns, &queue).await.unwrap();
        assert_eq!(report.updated.len(), 1);

        let albums = SqliteAlbumsRepository::new().all(&pool).await.unwrap();
        assert_eq!(albums[0].track_count(), Some(2));
        assert_eq!(albums[0].status(), AlbumStatus::Pending);
    }

    #[tokio::test]
    async fn force_rescan_deletes_and_reinserts() {
        let pool = prepare_db().await;
        let dir = tempdir().unwrap();
        let album_dir = dir.path().join("Artist - Album");
        fs::create_dir_all(&album_dir).unwrap();
        write_fake_audio(&album_dir.join("01.flac"));

        let patterns = DiscPatternSet::compile(&[], 0);
        let (queue, _worker) = WorkQueue::new();
        let scanner = Scanner::new();
        let first = scanner.scan_directory(&pool, dir.path(), false, &patterns, &queue).await.unwrap();
        let original_id = first.added[0];

        let second = scanner.scan_directory(&pool, dir.path(), true, &patterns, &queue).await.unwrap();
        assert!(second.removed.contains(&original_id));
        assert_eq!(second.added.len(), 1);
        assert_ne!(second.added[0], original_id);
    }
}

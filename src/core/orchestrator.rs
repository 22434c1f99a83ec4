use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::artwork::{self, ArtworkClients, ArtworkTarget};
use crate::core::audio_reader::{AlbumInfo, DiscPatternSet, TrackInfo};
use crate::core::backup::BackupStore;
use crate::core::clients::{
    AcoustIdClient, CoverArtArchiveClient, FanartTvClient, ITunesClient, LrclibClient, MbRelease, MbTrack, MusicBrainzClient,
};
use crate::core::fingerprint;
use crate::core::loudness;
use crate::core::matcher::{self, MatchDecision, MatchScore, PreferenceWeights};
use crate::core::queue::{HandlerOutcome, QueueHandler, WorkItem, WorkQueue};
use crate::core::scanner::Scanner;
use crate::core::tag_codec::{self, TagRecord};
use crate::domain::{Album, AlbumStatus, ActivityLogEntry, BackupAction, MatchCandidate, Track, TrackStatus};
use crate::repository::{SqliteActivityLogRepository, SqliteAlbumsRepository, SqliteMatchCandidatesRepository, SqliteTracksRepository};
use crate::services::settings::{ResolvedSettings, SettingsStore};

/// Pushed to subscribers of `Orchestrator::subscribe` as the pipeline moves
/// an album through its states. A short sleep follows every emission so a
/// subscriber on another thread gets a fair chance to observe intermediate
/// states rather than only the final one.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    AlbumUpdate { album_id: Uuid, status: AlbumStatus },
    Progress { album_id: Uuid, stage: String },
    Notification { message: String },
    ScanUpdate { added: usize, updated: usize, removed: usize },
}

/// Each variant carries its own Album/Track terminal-state handling, applied
/// in `apply_failure`.
#[derive(Debug)]
enum PipelineError {
    TransientExternal(String),
    NotFoundExternal(String),
    CorruptFile(String),
    WriteFailure(String),
    NoMatch,
    Internal(String),
}

impl From<crate::repository::RepositoryError> for PipelineError {
    fn from(err: crate::repository::RepositoryError) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

impl From<crate::core::backup::BackupError> for PipelineError {
    fn from(err: crate::core::backup::BackupError) -> Self {
        PipelineError::TransientExternal(err.to_string())
    }
}

/// One per-track tag assignment derived from the chosen release.
struct TrackAssignment {
    track_number: Option<u32>,
    track_total: Option<u32>,
    disc_number: Option<u32>,
    disc_total: Option<u32>,
    title: Option<String>,
    recording_id: Option<String>,
}

fn disc_track_totals(release: &MbRelease) -> HashMap<u32, u32> {
    let mut counts = HashMap::new();
    for t in &release.tracks {
        *counts.entry(t.disc_number.max(1)).or_insert(0u32) += 1;
    }
    counts
}

/// Maps every local track to a release track. Three cases:
/// consistent disc structure (match by disc/position, flat-index fallback),
/// local-flat/MB-multi (flat-assign in path order, discNumber forced to 1),
/// and local-multi/MB-flat (already penalized in scoring; flat-index using
/// the local file's own disc number if the match is still chosen).
fn assign_tracks(local_tracks: &[Track], release: &MbRelease) -> HashMap<Uuid, TrackAssignment> {
    let local_multi = local_tracks.iter().map(|t| t.disc_number()).collect::<HashSet<_>>().len() > 1;
    let mb_multi = release.disc_count() > 1;
    let disc_totals = disc_track_totals(release);

    let mut mb_flat: Vec<&MbTrack> = release.tracks.iter().collect();
    mb_flat.sort_by_key(|t| t.position);

    let mut assignments = HashMap::new();

    if local_multi == mb_multi {
        let mb_by_disc: HashMap<(u32, u32), &MbTrack> =
            release.tracks.iter().map(|t| ((t.disc_number.max(1), t.disc_position), t)).collect();

        let mut local_sorted: Vec<&Track> = local_tracks.iter().collect();
        local_sorted.sort_by_key(|t| (t.disc_number(), t.track_number().unwrap_or(0)));

        for (i, local) in local_sorted.iter().enumerate() {
            let disc = local.disc_number() as u32;
            let num = local.track_number().unwrap_or(0) as u32;
            let Some(mb) = mb_by_disc.get(&(disc, num)).copied().or_else(|| mb_flat.get(i).copied()) else { continue };

            assignments.insert(
                local.id(),
                TrackAssignment {
                    track_number: Some(if mb.disc_position > 0 { mb.disc_position } else { mb.position }),
                    track_total: disc_totals.get(&disc).copied(),
                    disc_number: Some(disc),
                    disc_total: mb_multi.then(|| release.disc_count()),
                    title: Some(mb.title.clone()),
                    recording_id: mb.recording_id.clone(),
                },
            );
        }
    } else if !local_multi && mb_multi {
        let mut local_sorted: Vec<&Track> = local_tracks.iter().collect();
        local_sorted.sort_by_key(|t| t.path().clone());

        for (i, local) in local_sorted.iter().enumerate() {
            let Some(mb) = mb_flat.get(i) else { continue };
            assignments.insert(
                local.id(),
                TrackAssignment {
                    track_number: Some(i as u32 + 1),
                    track_total: Some(mb_flat.len() as u32),
                    disc_number: Some(1),
                    disc_total: None,
                    title: Some(mb.title.clone()),
                    recording_id: mb.recording_id.clone(),
                },
            );
        }
    } else {
        let mut local_sorted: Vec<&Track> = local_tracks.iter().collect();
        local_sorted.sort_by_key(|t| (t.disc_number(), t.track_number().unwrap_or(0)));

        for (i, local) in local_sorted.iter().enumerate() {
            let Some(mb) = mb_flat.get(i) else { continue };
            assignments.insert(
                local.id(),
                TrackAssignment {
                    track_number: Some(mb.position),
                    track_total: Some(mb_flat.len() as u32),
                    disc_number: Some(local.disc_number() as u32),
                    disc_total: None,
                    title: Some(mb.title.clone()),
                    recording_id: mb.recording_id.clone(),
                },
            );
        }
    }

    assignments
}

fn album_info_from_persisted(album: &Album, tracks: &[Track]) -> AlbumInfo {
    AlbumInfo {
        path: album.path().clone(),
        artist: album.artist().map(String::from),
        album: album.album().map(String::from),
        year: album.year().map(|y| y as u32),
        tracks: tracks
            .iter()
            .map(|t| TrackInfo {
                path: t.path().clone(),
                title: t.title().map(String::from),
                artist: t.artist().map(String::from),
                album: album.album().map(String::from),
                album_artist: album.artist().map(String::from),
                track_number: t.track_number().map(|n| n as u32),
                disc_number: Some(t.disc_number() as u32),
                year: album.year().map(|y| y as u32),
                duration: t.duration(),
                has_cover: false,
                musicbrainz_recording_id: t.musicbrainz_recording_id().map(String::from),
                musicbrainz_release_id: None,
            })
            .collect(),
    }
}

/// Drives every mutating work item to completion: matching against
/// MusicBrainz, writing tags, fetching artwork, and the supplementary
/// lyrics/backup bookkeeping around them. Implements `QueueHandler` so
/// `WorkQueueWorker` can drive it from its own thread; every repository call
/// is bridged with `futures::executor::block_on`, the same way
/// `BackupStore` does.
pub struct Orchestrator {
    pool: SqlitePool,
    queue: WorkQueue,
    settings: Arc<SettingsStore>,
    albums_repo: SqliteAlbumsRepository,
    tracks_repo: SqliteTracksRepository,
    candidates_repo: SqliteMatchCandidatesRepository,
    activity_repo: SqliteActivityLogRepository,
    scanner: Scanner,
    backup_store: BackupStore,
    events: broadcast::Sender<ProgressEvent>,
}

impl Orchestrator {
    pub fn new(pool: SqlitePool, queue: WorkQueue, settings: Arc<SettingsStore>, backup_root: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            pool,
            queue,
            settings,
            albums_repo: SqliteAlbumsRepository::new(),
            tracks_repo: SqliteTracksRepository::new(),
            candidates_repo: SqliteMatchCandidatesRepository::new(),
            activity_repo: SqliteActivityLogRepository::new(),
            scanner: Scanner::new(),
            backup_store: BackupStore::new(backup_root),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Clone of the event sender, for wiring a façade's WebSocket broadcast
    /// without giving it mutation access to the Orchestrator itself.
    pub fn events_sender(&self) -> broadcast::Sender<ProgressEvent> {
        self.events.clone()
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
        // Gives a façade subscriber on another thread a fair chance to
        // observe this event before the next mutation blocks the worker
        // thread again.
        std::thread::sleep(std::time::Duration::from_millis(80));
    }

    fn handle_folder(&self, path: &std::path::Path) -> HandlerOutcome {
        let version = self.settings.version();
        let resolved = match futures::executor::block_on(self.settings.resolve(&self.pool)) {
            Ok(resolved) => resolved,
            Err(err) => {
                log::error!("Orchestrator: failed to resolve settings for {}: {err}", path.display());
                return HandlerOutcome::RetryableFailure;
            }
        };
        let patterns = DiscPatternSet::compile(&resolved.disc_subfolder_patterns, version);

        match futures::executor::block_on(self.scanner.scan_single_folder(&self.pool, path, &patterns, &self.queue)) {
            Ok(report) => {
                if !report.is_empty() {
                    self.emit(ProgressEvent::ScanUpdate { added: report.added.len(), updated: report.updated.len(), removed: report.removed.len() });
                }
                HandlerOutcome::Terminal
            }
            Err(err) => {
                log::error!("Orchestrator: folder scan failed for {}: {err}", path.display());
                HandlerOutcome::RetryableFailure
            }
        }
    }

    fn handle_tag_album(&self, album_id: Uuid, release_id: Option<String>, user_initiated: bool) -> HandlerOutcome {
        let album = match futures::executor::block_on(self.albums_repo.by_id_fetch(&self.pool, album_id)) {
            Ok(Some(album)) => album,
            Ok(None) => {
                log::warn!("Orchestrator: album {album_id} no longer exists, dropping work item");
                return HandlerOutcome::Terminal;
            }
            Err(err) => {
                log::error!("Orchestrator: failed to fetch album {album_id}: {err}");
                return HandlerOutcome::RetryableFailure;
            }
        };

        let tracks = match futures::executor::block_on(self.tracks_repo.all_by_album(&self.pool, album_id)) {
            Ok(tracks) => tracks,
            Err(err) => {
                log::error!("Orchestrator: failed to fetch tracks for album {album_id}: {err}");
                return HandlerOutcome::RetryableFailure;
            }
        };

        let settings = match futures::executor::block_on(self.settings.resolve(&self.pool)) {
            Ok(settings) => settings,
            Err(err) => {
                log::error!("Orchestrator: failed to resolve settings for album {album_id}: {err}");
                return HandlerOutcome::RetryableFailure;
            }
        };

        self.emit(ProgressEvent::Progress { album_id, stage: "matching".to_string() });
        match self.run_pipeline(&album, &tracks, release_id, user_initiated, &settings) {
            Ok(()) => HandlerOutcome::Terminal,
            Err(err) => self.apply_failure(&album, err),
        }
    }

    fn weights<'a>(&self, settings: &'a ResolvedSettings) -> PreferenceWeights<'a> {
        PreferenceWeights { preferred_media: &settings.preferred_media, preferred_countries: &settings.preferred_countries }
    }

    /// Runs search/score/decide and, for an auto-tag decision, the full
    /// write pipeline. Returns a typed `PipelineError` the caller maps onto
    /// terminal/retryable outcomes via `apply_failure`.
    fn run_pipeline(
        &self,
        album: &Album,
        tracks: &[Track],
        release_id: Option<String>,
        user_initiated: bool,
        settings: &ResolvedSettings,
    ) -> Result<(), PipelineError> {
        let info = album_info_from_persisted(album, tracks);
        let mb = MusicBrainzClient::new();
        let weights = self.weights(settings);

        let (candidates, forced_auto_tag) = if let Some(rid) = release_id.as_deref() {
            let release = mb.get_release_details(rid).ok_or_else(|| PipelineError::NotFoundExternal(format!("release {rid} not found")))?;
            (vec![matcher::score_release(&info, &release, None, &weights)], true)
        } else {
            let mut candidates = matcher::find_matches(&mb, &info, &weights, 10);

            if settings.fingerprint_enabled && !settings.acoustid_api_key.is_empty() {
                if candidates.is_empty() {
                    // Primary path: no text hits at all, fingerprinting is the only way in.
                    let acoustid = AcoustIdClient::new(settings.acoustid_api_key.clone());
                    let fingerprints = fingerprint::fingerprint_album(&acoustid, &info.tracks, 5);
                    let fp_matches = fingerprint::aggregate_release_candidates(&fingerprints);
                    if !fp_matches.is_empty() {
                        candidates = matcher::find_matches_by_fingerprint(&mb, &fp_matches, &info, &weights, 10);
                    }
                } else if candidates[0].total_score < settings.confidence_auto_threshold {
                    // Supplementary path: best text score isn't good enough yet. Re-score the
                    // releases already fetched with the fingerprint bonus folded in; this does
                    // not fetch releases known only via AcoustID (see decide_action policy).
                    let acoustid = AcoustIdClient::new(settings.acoustid_api_key.clone());
                    let fingerprints = fingerprint::fingerprint_album(&acoustid, &info.tracks, 5);
                    let fp_matches = fingerprint::aggregate_release_candidates(&fingerprints);
                    if !fp_matches.is_empty() {
                        candidates = candidates.into_iter().map(|c| matcher::score_release(&info, &c.release, Some(&fp_matches), &weights)).collect();
                        candidates.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap());
                    }
                }
            }

            (candidates, false)
        };

        if candidates.is_empty() {
            return Err(PipelineError::NoMatch);
        }

        self.save_candidates(album.id(), &candidates)?;
        let top = &candidates[0];

        let decision = if forced_auto_tag {
            MatchDecision::AutoTag
        } else {
            let decision = matcher::decide_action(top.total_score, settings.confidence_auto_threshold, settings.confidence_review_threshold);
            if decision == MatchDecision::AutoTag && !settings.auto_tag_on_scan && !user_initiated {
                MatchDecision::NeedsReview
            } else {
                decision
            }
        };

        match decision {
            MatchDecision::AutoTag => self.auto_tag(album, tracks, top, settings),
            MatchDecision::NeedsReview => self.finish_terminal(album, AlbumStatus::NeedsReview, top.total_score, "needs_review"),
            MatchDecision::Skip => self.finish_terminal(album, AlbumStatus::Skipped, top.total_score, "skipped_low_confidence"),
        }
    }

    fn save_candidates(&self, album_id: Uuid, candidates: &[MatchScore]) -> Result<(), PipelineError> {
        futures::executor::block_on(async {
            let mut tx = self.pool.begin().await.map_err(crate::repository::RepositoryError::from_sqlx_error)?;
            self.candidates_repo.clear_for_album(&mut *tx, album_id).await?;

            let mut top_id = None;
            for (i, score) in candidates.iter().enumerate() {
                let mut candidate = MatchCandidate::new(Uuid::new_v4(), album_id, score.release.release_id.clone(), score.total_score, Utc::now())
                    .map_err(crate::repository::RepositoryError::from)?;
                candidate.set_artist(Some(score.release.artist.clone()));
                candidate.set_album(Some(score.release.title.clone()));
                candidate.set_year(score.release.year);
                candidate.set_original_year(score.release.original_year);
                candidate.set_track_count(Some(score.release.track_count as i64));
                candidate.set_country(score.release.country.clone());
                candidate.set_media(score.release.media.clone());
                candidate.set_label(score.release.label.clone());
                candidate.set_barcode(score.release.barcode.clone());

                let saved = self.candidates_repo.save(&mut *tx, &candidate).await?;
                if i == 0 {
                    top_id = Some(saved.id());
                }
            }

            if let Some(top_id) = top_id {
                self.candidates_repo.mark_selected(&mut *tx, album_id, top_id).await?;
            }

            tx.commit().await.map_err(crate::repository::RepositoryError::from_sqlx_error)?;
            Ok::<_, crate::repository::RepositoryError>(())
        })?;
        Ok(())
    }

    /// The full write path for an auto-tag decision: pre-mutation backup,
    /// per-track tag writes, artwork, lyrics, backup pruning, then the
    /// Album row update.
    fn auto_tag(&self, album: &Album, tracks: &[Track], chosen: &MatchScore, settings: &ResolvedSettings) -> Result<(), PipelineError> {
        self.emit(ProgressEvent::Progress { album_id: album.id(), stage: "backing_up".to_string() });
        if settings.backup_enabled {
            self.backup_store.create_backup(&self.pool, album.id(), BackupAction::MusicbrainzTag, tracks)?;
        }

        self.emit(ProgressEvent::Progress { album_id: album.id(), stage: "writing_tags".to_string() });
        let assignments = assign_tracks(tracks, &chosen.release);
        let mut tagged_count = 0usize;
        let mut attempted_count = 0usize;

        for track in tracks {
            attempted_count += 1;
            let assignment = assignments.get(&track.id());

            let record = TagRecord {
                title: assignment.and_then(|a| a.title.clone()),
                artist: Some(chosen.release.artist.clone()),
                album_artist: Some(chosen.release.artist.clone()),
                album: Some(chosen.release.title.clone()),
                track_number: assignment.and_then(|a| a.track_number),
                track_total: assignment.and_then(|a| a.track_total),
                disc_number: assignment.and_then(|a| a.disc_number),
                disc_total: assignment.and_then(|a| a.disc_total),
                year: chosen.release.original_year.or(chosen.release.year).map(|y| y as u32),
                genre: chosen.release.genres.first().cloned(),
                label: chosen.release.label.clone(),
                country: chosen.release.country.clone(),
                release_id: Some(chosen.release.release_id.clone()),
                recording_id: assignment.and_then(|a| a.recording_id.clone()),
                cover_data: None,
                cover_mime: None,
            };

            let mut updated = track.clone();
            match tag_codec::write_tags(track.path(), &record) {
                Ok(true) => {
                    tagged_count += 1;
                    updated.set_title(record.title);
                    updated.set_artist(record.artist);
                    updated.set_track_number(record.track_number.map(|n| n as i32));
                    if let Some(disc) = record.disc_number {
                        updated.set_disc_number(disc as i32);
                    }
                    updated.set_musicbrainz_recording_id(record.recording_id);
                    updated.set_status(TrackStatus::Tagged);
                    updated.set_error_message(None);
                }
                Ok(false) => {
                    log::warn!("Orchestrator: write_tags reported failure for {}", track.path().display());
                    updated.set_status(TrackStatus::Failed);
                    updated.set_error_message(Some("tag write failed".to_string()));
                }
                Err(err) => {
                    log::warn!("Orchestrator: unreadable/corrupt file {}: {err}", track.path().display());
                    updated.set_status(TrackStatus::Failed);
                    updated.set_error_message(Some(err.to_string()));
                }
            }
            updated.touch(Utc::now());
            futures::executor::block_on(self.tracks_repo.update(&self.pool, &updated))?;
        }

        if tagged_count == 0 {
            return Err(PipelineError::WriteFailure(format!("0/{attempted_count} tracks written for album {}", album.id())));
        }

        self.emit(ProgressEvent::Progress { album_id: album.id(), stage: "artwork".to_string() });
        self.fetch_and_apply_artwork(album, tracks, chosen, settings);

        if settings.lyrics_enabled && settings.lyrics_auto_fetch {
            self.emit(ProgressEvent::Progress { album_id: album.id(), stage: "lyrics".to_string() });
            self.fetch_and_apply_lyrics(tracks, chosen);
        }

        if settings.replaygain_enabled && settings.replaygain_auto_calculate {
            self.emit(ProgressEvent::Progress { album_id: album.id(), stage: "replaygain".to_string() });
            self.calculate_and_apply_replaygain(album, tracks, settings);
        }

        if settings.backup_enabled {
            if let Err(err) = self.backup_store.prune(&self.pool, album.id(), settings.backup_max_per_album) {
                log::warn!("Orchestrator: backup prune failed for album {}: {err}", album.id());
            }
        }

        let mut updated = album.clone();
        updated.set_status(AlbumStatus::Tagged);
        updated.set_artist(Some(chosen.release.artist.clone()));
        updated.set_album(Some(chosen.release.title.clone()));
        updated.set_year(chosen.release.original_year.or(chosen.release.year));
        updated.set_musicbrainz_release_id(Some(chosen.release.release_id.clone()));
        updated.set_musicbrainz_release_group_id(chosen.release.release_group_id.clone());
        updated.set_match_confidence(Some(chosen.total_score));
        updated.set_error_message(None);
        updated.reset_retry_count();
        updated.touch(Utc::now());
        futures::executor::block_on(self.albums_repo.update(&self.pool, &updated))?;

        futures::executor::block_on(
            self.activity_repo.record(&self.pool, &ActivityLogEntry::new(Uuid::new_v4(), Some(album.id()), "tagged".to_string(), Utc::now())),
        )?;

        log::info!(
            "Orchestrator: tagged album {} as '{}' - '{}' ({tagged_count}/{attempted_count} tracks, confidence {:.1})",
            album.id(),
            chosen.release.artist,
            chosen.release.title,
            chosen.total_score
        );
        self.emit(ProgressEvent::AlbumUpdate { album_id: album.id(), status: AlbumStatus::Tagged });
        Ok(())
    }

    fn fetch_and_apply_artwork(&self, album: &Album, tracks: &[Track], chosen: &MatchScore, settings: &ResolvedSettings) {
        if settings.backup_enabled {
            if let Err(err) = self.backup_store.create_backup(&self.pool, album.id(), BackupAction::Artwork, tracks) {
                log::warn!("Orchestrator: pre-artwork backup failed for album {}: {err}", album.id());
            }
        }

        let caa = CoverArtArchiveClient::new();
        let itunes = ITunesClient::new();
        let fanarttv = FanartTvClient::new(Some(settings.fanarttv_api_key.clone()).filter(|k| !k.is_empty()));
        let clients = ArtworkClients { caa: &caa, itunes: &itunes, fanarttv: &fanarttv };

        let target = ArtworkTarget {
            folder_path: album.path(),
            artist: &chosen.release.artist,
            album: &chosen.release.title,
            musicbrainz_release_id: &chosen.release.release_id,
            musicbrainz_release_group_id: chosen.release.release_group_id.as_deref().unwrap_or(""),
        };

        let Some((data, mime)) = artwork::fetch_artwork(&clients, &target, &settings.artwork_sources, settings.artwork_min_size as u32) else {
            return;
        };

        match artwork::save_artwork_to_folder(album.path(), &data, &mime) {
            Ok(cover_path) => {
                let mut updated = album.clone();
                updated.set_cover_path(Some(cover_path));
                updated.touch(Utc::now());
                if let Err(err) = futures::executor::block_on(self.albums_repo.update(&self.pool, &updated)) {
                    log::warn!("Orchestrator: failed to persist cover path for album {}: {err}", album.id());
                }

                for track in tracks {
                    if let Ok(mut record) = tag_codec::read_tags(track.path()) {
                        record = record.with_cover(data.clone(), mime.clone());
                        let _ = tag_codec::write_tags(track.path(), &record);
                    }
                }
            }
            Err(err) => log::warn!("Orchestrator: failed to save artwork for album {}: {err}", album.id()),
        }
    }

    fn fetch_and_apply_lyrics(&self, tracks: &[Track], chosen: &MatchScore) {
        let lrclib = LrclibClient::new();
        for track in tracks {
            let Some(title) = track.title() else { continue };
            let duration = track.duration().unwrap_or(0.0).round() as u32;
            let Some(lyrics) = lrclib.fetch_lyrics(&chosen.release.artist, title, &chosen.release.title, duration) else { continue };
            if lyrics.instrumental {
                continue;
            }

            match tag_codec::write_lyrics(track.path(), lyrics.plain_lyrics.as_deref(), lyrics.synced_lyrics.as_deref()) {
                Ok(true) => {
                    let mut updated = track.clone();
                    updated.set_lyrics_flags(true, lyrics.synced_lyrics.is_some());
                    updated.touch(Utc::now());
                    let _ = futures::executor::block_on(self.tracks_repo.update(&self.pool, &updated));
                }
                Ok(false) => log::warn!("Orchestrator: lyrics write failed for {}", track.path().display()),
                Err(err) => log::warn!("Orchestrator: lyrics write errored for {}: {err}", track.path().display()),
            }
        }
    }

    /// Measures per-track loudness, derives album gain from the tracks'
    /// averaged power, and writes ReplayGain tags plus the cached columns
    /// on both Track and Album.
    fn calculate_and_apply_replaygain(&self, album: &Album, tracks: &[Track], settings: &ResolvedSettings) {
        let mut measured: Vec<(&Track, loudness::TrackLoudness)> = Vec::new();
        for track in tracks {
            match loudness::analyze_track(track.path()) {
                Ok(l) => measured.push((track, l)),
                Err(err) => log::warn!("Orchestrator: ReplayGain analysis failed for {}: {err}", track.path().display()),
            }
        }

        if measured.is_empty() {
            log::warn!("Orchestrator: no tracks could be analyzed for ReplayGain on album {}", album.id());
            return;
        }

        let loudnesses: Vec<loudness::TrackLoudness> = measured.iter().map(|(_, l)| *l).collect();
        let reference = settings.replaygain_reference_loudness;
        let album_gain = loudness::album_gain(&loudnesses, reference);
        let album_peak = loudness::album_peak(&loudnesses);

        for (track, l) in &measured {
            let track_gain = loudness::track_gain(l, reference);
            match tag_codec::write_replaygain(track.path(), Some(track_gain), Some(l.peak), Some(album_gain), Some(album_peak)) {
                Ok(true) => {
                    let mut updated = (*track).clone();
                    updated.set_replaygain(Some(format!("{track_gain:.2} dB")), Some(format!("{:.6}", l.peak)));
                    updated.touch(Utc::now());
                    let _ = futures::executor::block_on(self.tracks_repo.update(&self.pool, &updated));
                }
                Ok(false) => log::warn!("Orchestrator: ReplayGain write failed for {}", track.path().display()),
                Err(err) => log::warn!("Orchestrator: ReplayGain write errored for {}: {err}", track.path().display()),
            }
        }

        let mut updated_album = album.clone();
        updated_album.set_replaygain(Some(format!("{album_gain:.2} dB")), Some(format!("{album_peak:.6}")));
        updated_album.touch(Utc::now());
        if let Err(err) = futures::executor::block_on(self.albums_repo.update(&self.pool, &updated_album)) {
            log::warn!("Orchestrator: failed to persist album ReplayGain for {}: {err}", album.id());
        }
    }

    fn finish_terminal(&self, album: &Album, status: AlbumStatus, confidence: f64, activity: &str) -> Result<(), PipelineError> {
        let mut updated = album.clone();
        updated.set_status(status);
        updated.set_match_confidence(Some(confidence));
        updated.touch(Utc::now());
        futures::executor::block_on(self.albums_repo.update(&self.pool, &updated))?;
        futures::executor::block_on(
            self.activity_repo.record(&self.pool, &ActivityLogEntry::new(Uuid::new_v4(), Some(album.id()), activity.to_string(), Utc::now())),
        )?;
        self.emit(ProgressEvent::AlbumUpdate { album_id: album.id(), status });
        Ok(())
    }

    /// Maps a `PipelineError` onto its terminal Album state and the queue
    /// retry decision.
    fn apply_failure(&self, album: &Album, err: PipelineError) -> HandlerOutcome {
        match err {
            PipelineError::TransientExternal(msg) => {
                log::warn!("Orchestrator: transient failure for album {}: {msg}", album.id());
                HandlerOutcome::RetryableFailure
            }
            PipelineError::NotFoundExternal(msg) => {
                log::warn!("Orchestrator: {msg}");
                let _ = self.finish_terminal(album, AlbumStatus::Skipped, 0.0, "release_not_found");
                HandlerOutcome::Terminal
            }
            PipelineError::NoMatch => {
                let msg = "No MusicBrainz matches found";
                log::warn!("Orchestrator: {msg} for album {}", album.id());
                let mut updated = album.clone();
                updated.set_status(AlbumStatus::Failed);
                updated.set_error_message(Some(msg.to_string()));
                updated.increment_retry_count();
                updated.touch(Utc::now());
                let _ = futures::executor::block_on(self.albums_repo.update(&self.pool, &updated));
                let _ = futures::executor::block_on(
                    self.activity_repo.record(&self.pool, &ActivityLogEntry::new(Uuid::new_v4(), Some(album.id()), "match_failed".to_string(), Utc::now())),
                );
                self.emit(ProgressEvent::AlbumUpdate { album_id: album.id(), status: AlbumStatus::Failed });
                HandlerOutcome::RetryableFailure
            }
            PipelineError::CorruptFile(msg) | PipelineError::WriteFailure(msg) => {
                log::error!("Orchestrator: album {} failed during tag write: {msg}", album.id());
                let mut updated = album.clone();
                updated.set_status(AlbumStatus::Failed);
                updated.set_error_message(Some(msg));
                updated.touch(Utc::now());
                let _ = futures::executor::block_on(self.albums_repo.update(&self.pool, &updated));
                self.emit(ProgressEvent::AlbumUpdate { album_id: album.id(), status: AlbumStatus::Failed });
                HandlerOutcome::Terminal
            }
            PipelineError::Internal(msg) => {
                log::error!("Orchestrator: internal error processing album {}: {msg}", album.id());
                let mut updated = album.clone();
                updated.set_status(AlbumStatus::Failed);
                updated.set_error_message(Some(msg));
                updated.increment_retry_count();
                updated.touch(Utc::now());
                let _ = futures::executor::block_on(self.albums_repo.update(&self.pool, &updated));
                self.emit(ProgressEvent::AlbumUpdate { album_id: album.id(), status: AlbumStatus::Failed });
                HandlerOutcome::Terminal
            }
        }
    }
}

impl QueueHandler for Orchestrator {
    fn handle(&self, item: &WorkItem) -> HandlerOutcome {
        match item {
            WorkItem::FolderScanAndTag(path) => self.handle_folder(path),
            WorkItem::TagAlbum { album_id, release_id, user_initiated } => self.handle_tag_album(*album_id, release_id.clone(), *user_initiated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mb_track(position: u32, disc: u32, disc_pos: u32) -> MbTrack {
        MbTrack { position, disc_number: disc, disc_position: disc_pos, title: format!("Track {position}"), duration_ms: Some(200_000), recording_id: Some(format!("r{position}")) }
    }

    fn local_track(disc: i32, number: i32, path: &str) -> Track {
        let now = Utc::now();
        let mut t = Track::new(Uuid::new_v4(), Uuid::new_v4(), PathBuf::from(path), disc, now, now).unwrap();
        t.set_track_number(Some(number));
        t
    }

    #[test]
    fn assign_tracks_matches_consistent_single_disc_by_position() {
        let local = vec![local_track(1, 1, "/a/01.flac"), local_track(1, 2, "/a/02.flac")];
        let release = MbRelease { tracks: vec![mb_track(1, 1, 1), mb_track(2, 1, 2)], ..Default::default() };

        let assignments = assign_tracks(&local, &release);
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[&local[0].id()].track_number, Some(1));
        assert_eq!(assignments[&local[0].id()].disc_number, Some(1));
    }

    #[test]
    fn assign_tracks_flat_local_against_multi_disc_release_forces_disc_one() {
        let local = vec![local_track(1, 1, "/a/01.flac"), local_track(1, 2, "/a/02.flac")];
        let release = MbRelease { tracks: vec![mb_track(1, 1, 1), mb_track(2, 2, 1)], ..Default::default() };

        let assignments = assign_tracks(&local, &release);
        for a in assignments.values() {
            assert_eq!(a.disc_number, Some(1));
        }
    }

    #[test]
    fn assign_tracks_multi_disc_local_against_single_disc_release_keeps_local_discs() {
        let local = vec![local_track(1, 1, "/a/cd1/01.flac"), local_track(2, 1, "/a/cd2/01.flac")];
        let release = MbRelease { tracks: vec![mb_track(1, 1, 1), mb_track(2, 1, 2)], ..Default::default() };

        let assignments = assign_tracks(&local, &release);
        assert_eq!(assignments[&local[0].id()].disc_number, Some(1));
        assert_eq!(assignments[&local[1].id()].disc_number, Some(2));
    }
}

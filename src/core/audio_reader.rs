use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use regex::Regex;
use walkdir::WalkDir;

pub const AUDIO_EXTENSIONS: &[&str] = &["flac", "mp3", "m4a", "mp4", "ogg", "opus", "wma", "wav"];

fn is_audio_extension(ext: &OsStr) -> bool {
    ext.to_str().map(|s| AUDIO_EXTENSIONS.contains(&s.to_lowercase().as_str())).unwrap_or(false)
}

pub fn is_audio_file(path: &Path) -> bool {
    path.is_file() && path.extension().map(is_audio_extension).unwrap_or(false)
}

/// Direct children of `dir` only (`min_depth(1).max_depth(1)`), bounded to
/// one level since every caller here already enforces its own two-level cap:
/// a recursive walk would swallow the flat/multi-disc/artist-album
/// classification below.
fn direct_children(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok().map(|e| e.into_path()))
}

pub fn has_audio_files(dir: &Path) -> bool {
    direct_children(dir).any(|p| is_audio_file(&p))
}

/// Counts audio files directly inside `dir`.
pub fn count_audio_files(dir: &Path) -> usize {
    direct_children(dir).filter(|p| is_audio_file(p)).count()
}

#[derive(Debug, Clone, Default)]
pub struct TrackInfo {
    pub path: PathBuf,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<u32>,
    pub duration: Option<f64>,
    pub has_cover: bool,
    pub musicbrainz_recording_id: Option<String>,
    pub musicbrainz_release_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AlbumInfo {
    pub path: PathBuf,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub tracks: Vec<TrackInfo>,
}

impl AlbumInfo {
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn disc_count(&self) -> usize {
        if self.tracks.is_empty() {
            return 1;
        }
        let discs: std::collections::HashSet<u32> = self.tracks.iter().map(|t| t.disc_number.unwrap_or(1)).collect();
        discs.len()
    }

    pub fn disc_track_counts(&self) -> HashMap<u32, u32> {
        let mut counts = HashMap::new();
        for t in &self.tracks {
            *counts.entry(t.disc_number.unwrap_or(1)).or_insert(0) += 1;
        }
        counts
    }
}

fn most_common<T: Eq + std::hash::Hash + Clone>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(v, _)| v)
}

pub fn read_track(path: &Path) -> Option<TrackInfo> {
    let tagged = match Probe::open(path).and_then(|p| p.read()) {
        Ok(tagged) => tagged,
        Err(err) => {
            log::error!("Error reading {}: {}", path.display(), err);
            return None;
        }
    };

    let duration = Some(tagged.properties().duration().as_secs_f64());
    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Some(TrackInfo {
            path: path.to_path_buf(),
            duration,
            ..Default::default()
        });
    };

    Some(TrackInfo {
        path: path.to_path_buf(),
        title: tag.title().map(|s| s.to_string()),
        artist: tag.artist().map(|s| s.to_string()),
        album: tag.album().map(|s| s.to_string()),
        album_artist: tag.get_string(&lofty::tag::ItemKey::AlbumArtist).map(str::to_string),
        track_number: tag.track(),
        disc_number: tag.disk(),
        year: tag.year(),
        duration,
        has_cover: !tag.pictures().is_empty(),
        musicbrainz_recording_id: tag.get_string(&lofty::tag::ItemKey::MusicBrainzRecordingId).map(str::to_string),
        musicbrainz_release_id: tag.get_string(&lofty::tag::ItemKey::MusicBrainzReleaseId).map(str::to_string),
    })
}

fn audio_files_sorted(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = direct_children(dir).filter(|p| is_audio_file(p)).collect();
    paths.sort();
    paths
}

fn album_from_tracks(path: &Path, mut tracks: Vec<TrackInfo>) -> Option<AlbumInfo> {
    if tracks.is_empty() {
        return None;
    }

    let artist = most_common(tracks.iter().filter_map(|t| t.album_artist.clone().or_else(|| t.artist.clone())));
    let album = most_common(tracks.iter().filter_map(|t| t.album.clone()));
    let year = most_common(tracks.iter().filter_map(|t| t.year));

    tracks.sort_by_key(|t| (t.disc_number.unwrap_or(1), t.track_number.unwrap_or(0)));

    Some(AlbumInfo {
        path: path.to_path_buf(),
        artist,
        album,
        year,
        tracks,
    })
}

/// `scanAlbum` for a flat directory: reads every audio file directly inside
/// `dir` and aggregates plurality-vote album metadata. Unreadable files are
/// skipped with a warning (already logged by `read_track`); returns `None`
/// if no tracks were readable.
pub fn scan_album_folder(dir: &Path) -> Option<AlbumInfo> {
    if !dir.is_dir() {
        return None;
    }

    let tracks: Vec<TrackInfo> = audio_files_sorted(dir).into_iter().filter_map(|p| read_track(&p)).collect();
    album_from_tracks(dir, tracks)
}

/// `scanAlbum` for a multi-disc tree: merges tracks across every disc
/// subfolder, stamping each with its subfolder's disc number when the
/// file's own tag omits one.
pub fn scan_multi_disc_album(parent: &Path, disc_folders: &HashMap<u32, PathBuf>) -> Option<AlbumInfo> {
    let mut discs: Vec<(&u32, &PathBuf)> = disc_folders.iter().collect();
    discs.sort_by_key(|(n, _)| **n);

    let mut all_tracks = Vec::new();
    for (disc_num, disc_path) in discs {
        for path in audio_files_sorted(disc_path) {
            if let Some(mut track) = read_track(&path) {
                if track.disc_number.is_none() {
                    track.disc_number = Some(*disc_num);
                }
                all_tracks.push(track);
            }
        }
    }

    album_from_tracks(parent, all_tracks)
}

/// Directory classification: flat album, multi-disc album, or non-album
/// (caller may recurse one level).
pub enum FolderKind {
    Flat,
    MultiDisc(HashMap<u32, PathBuf>),
    NonAlbum,
}

pub fn classify_folder(dir: &Path, disc_patterns: &DiscPatternSet) -> FolderKind {
    if has_audio_files(dir) {
        return FolderKind::Flat;
    }

    let disc_folders = find_disc_subfolders(dir, disc_patterns);
    if !disc_folders.is_empty() {
        return FolderKind::MultiDisc(disc_folders);
    }

    FolderKind::NonAlbum
}

/// Maps a single letter capture (`A..Z`/`a..z`) to a 1-based disc number.
fn letter_to_disc_number(capture: &str) -> Option<u32> {
    let mut chars = capture.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_alphabetic() {
        return None;
    }
    Some((c.to_ascii_uppercase() as u32) - ('A' as u32) + 1)
}

fn capture_to_disc_number(capture: &str) -> Option<u32> {
    if let Ok(n) = capture.trim().parse::<u32>() {
        return Some(n);
    }
    letter_to_disc_number(capture.trim())
}

/// Compiled, version-stamped disc-subfolder pattern set. Rebuilt whenever
/// the settings version it was built under goes stale.
pub struct DiscPatternSet {
    patterns: Vec<Regex>,
    built_under_version: u64,
}

impl DiscPatternSet {
    pub fn compile(raw_patterns: &[String], version: u64) -> Self {
        let patterns = raw_patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
                Ok(re) => Some(re),
                Err(err) => {
                    log::warn!("Invalid disc subfolder pattern {p:?}: {err}");
                    None
                }
            })
            .collect();

        Self { patterns, built_under_version: version }
    }

    pub fn is_stale(&self, current_version: u64) -> bool {
        self.built_under_version != current_version
    }

    pub fn disc_number_for(&self, folder_name: &str) -> Option<u32> {
        let name = folder_name.trim();
        for pattern in &self.patterns {
            let Some(captures) = pattern.captures(name) else {
                continue;
            };

            for i in 1..captures.len() {
                if let Some(m) = captures.get(i) {
                    return capture_to_disc_number(m.as_str());
                }
            }
        }
        None
    }
}

pub fn find_disc_subfolders(dir: &Path, patterns: &DiscPatternSet) -> HashMap<u32, PathBuf> {
    let mut result = HashMap::new();
    for path in direct_children(dir).filter(|p| p.is_dir()) {
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };

        if let Some(disc_num) = patterns.disc_number_for(name) {
            if has_audio_files(&path) {
                result.insert(disc_num, path);
            }
        }
    }

    result
}

/// Shared two-level traversal used by both the Scanner and the Watcher:
/// root's children are candidate albums; a child with no direct audio but
/// with disc-pattern subfolders is a multi-disc album; otherwise recurse
/// one level for artist/album tree layouts.
pub fn discover_album_folders(root: &Path, patterns: &DiscPatternSet) -> Vec<PathBuf> {
    let mut result = Vec::new();

    for path in direct_children(root).filter(|p| p.is_dir()) {
        match classify_folder(&path, patterns) {
            FolderKind::Flat | FolderKind::MultiDisc(_) => result.push(path),
            FolderKind::NonAlbum => {
                for sub_path in direct_children(&path).filter(|p| p.is_dir()) {
                    if let FolderKind::Flat | FolderKind::MultiDisc(_) = classify_folder(&sub_path, patterns) {
                        result.push(sub_path);
                    }
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_patterns() -> DiscPatternSet {
        DiscPatternSet::compile(
            &[
                r"^(?:cd|disc|disk)[\s_-]*(\d+)$".to_string(),
                r"^(?:cd|disc|disk)[\s_-]*([A-Za-z])$".to_string(),
            ],
            0,
        )
    }

    #[test]
    fn disc_pattern_numeric_capture() {
        let patterns = default_patterns();
        assert_eq!(patterns.disc_number_for("CD1"), Some(1));
        assert_eq!(patterns.disc_number_for("Disc 2"), Some(2));
    }

    #[test]
    fn disc_pattern_letter_capture_maps_alphabetically() {
        let patterns = default_patterns();
        assert_eq!(patterns.disc_number_for("Disc A"), Some(1));
        assert_eq!(patterns.disc_number_for("Disc B"), Some(2));
        assert_eq!(patterns.disc_number_for("disc z"), Some(26));
    }

    #[test]
    fn disc_pattern_no_match_returns_none() {
        let patterns = default_patterns();
        assert_eq!(patterns.disc_number_for("Bonus Tracks"), None);
    }

    #[test]
    fn pattern_set_staleness_tracks_version() {
        let patterns = DiscPatternSet::compile(&[], 3);
        assert!(!patterns.is_stale(3));
        assert!(patterns.is_stale(4));
    }

    #[test]
    fn scan_album_folder_on_missing_dir_returns_none() {
        assert!(scan_album_folder(Path::new("/does/not/exist")).is_none());
    }
}

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chromaprint::Chromaprint;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::core::audio_reader::TrackInfo;
use crate::core::clients::{AcoustIdClient, AcoustIdResult};
use crate::core::CoreError;

#[derive(Debug, Clone)]
pub struct TrackFingerprint {
    pub path: std::path::PathBuf,
    pub duration: f64,
    pub fingerprint: String,
    pub acoustid_results: Vec<AcoustIdResult>,
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintMatch {
    pub release_id: String,
    pub matched_tracks: usize,
    pub total_tracks: usize,
    pub avg_score: f64,
    pub recording_ids: Vec<String>,
}

/// Decodes `path` with symphonia and feeds 16-bit PCM into Chromaprint.
pub fn generate_fingerprint(path: &Path) -> Result<(String, f64), CoreError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| CoreError::CorruptFile(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| CoreError::UnsupportedFormat("no decodable track".to_string()))?;
    let track_id = track.id;

    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2).max(1) as i32;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CoreError::UnsupportedFormat(e.to_string()))?;

    let mut chroma = Chromaprint::new();
    chroma.start(sample_rate as i32, channels);

    let mut total_frames: u64 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => break,
            Err(SymphoniaError::IoError(_)) => break,
            Err(err) => return Err(CoreError::CorruptFile(err.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(err) => return Err(CoreError::CorruptFile(err.to_string())),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        total_frames += (sample_buf.samples().len() / channels.max(1) as usize) as u64;
        chroma.feed(sample_buf.samples());
    }

    chroma.finish();
    let fingerprint = chroma.fingerprint().ok_or_else(|| CoreError::CorruptFile("chromaprint produced no fingerprint".to_string()))?;
    let duration = total_frames as f64 / sample_rate as f64;

    Ok((fingerprint, duration))
}

pub fn fingerprint_file(path: &Path) -> Option<TrackFingerprint> {
    match generate_fingerprint(path) {
        Ok((fingerprint, duration)) => Some(TrackFingerprint {
            path: path.to_path_buf(),
            duration,
            fingerprint,
            acoustid_results: Vec::new(),
        }),
        Err(err) => {
            log::warn!("Fingerprint failed for {}: {err}", path.display());
            None
        }
    }
}

pub fn lookup_fingerprint(client: &AcoustIdClient, fp: &mut TrackFingerprint) {
    fp.acoustid_results = client.lookup(&fp.fingerprint, fp.duration);
}

/// Selects up to `max_tracks` tracks distributed evenly across the album,
/// skipping anything under 30s.
fn select_tracks(tracks: &[TrackInfo], max_tracks: usize) -> Vec<&TrackInfo> {
    let eligible: Vec<&TrackInfo> = tracks.iter().filter(|t| t.duration.map(|d| d >= 30.0).unwrap_or(false)).collect();

    if eligible.is_empty() {
        return Vec::new();
    }
    if eligible.len() <= max_tracks {
        return eligible;
    }

    let step = eligible.len() as f64 / max_tracks as f64;
    (0..max_tracks).map(|j| eligible[(j as f64 * step) as usize]).collect()
}

/// Fingerprints a selection of tracks and looks each up on AcoustID.
pub fn fingerprint_album(client: &AcoustIdClient, tracks: &[TrackInfo], max_tracks: usize) -> Vec<TrackFingerprint> {
    let selected = select_tracks(tracks, max_tracks);
    if selected.is_empty() {
        log::warn!("No eligible tracks for fingerprinting (all too short?)");
        return Vec::new();
    }

    let mut fingerprints: Vec<TrackFingerprint> = selected.iter().filter_map(|t| fingerprint_file(&t.path)).collect();

    if fingerprints.is_empty() {
        log::warn!("All fingerprint attempts failed");
        return Vec::new();
    }

    log::info!("Fingerprinted {}/{} tracks, looking up on AcoustID...", fingerprints.len(), selected.len());
    for fp in &mut fingerprints {
        lookup_fingerprint(client, fp);
    }

    fingerprints
}

/// Groups AcoustID results by release id, counting distinct-track matches
/// and averaging confidence.
pub fn aggregate_release_candidates(fingerprints: &[TrackFingerprint]) -> Vec<FingerprintMatch> {
    struct Accum {
        scores: Vec<f64>,
        recording_ids: HashSet<String>,
    }

    let mut release_data: HashMap<String, Accum> = HashMap::new();
    let total_tracks = fingerprints.len();

    for fp in fingerprints {
        let mut seen_for_track: HashSet<&str> = HashSet::new();
        for result in &fp.acoustid_results {
            for release_id in &result.release_ids {
                if !seen_for_track.insert(release_id.as_str()) {
                    continue;
                }
                let entry = release_data.entry(release_id.clone()).or_insert_with(|| Accum { scores: Vec::new(), recording_ids: HashSet::new() });
                entry.scores.push(result.score);
                entry.recording_ids.insert(result.recording_id.clone());
            }
        }
    }

    let mut matches: Vec<FingerprintMatch> = release_data
        .into_iter()
        .map(|(release_id, data)| {
            let avg_score = if data.scores.is_empty() { 0.0 } else { data.scores.iter().sum::<f64>() / data.scores.len() as f64 };
            FingerprintMatch {
                release_id,
                matched_tracks: data.scores.len(),
                total_tracks,
                avg_score,
                recording_ids: data.recording_ids.into_iter().collect(),
            }
        })
        .collect();

    matches.sort_by(|a, b| (a.matched_tracks, ordered(a.avg_score)).cmp(&(b.matched_tracks, ordered(b.avg_score))).reverse());
    matches.truncate(10);
    matches
}

fn ordered(score: f64) -> i64 {
    (score * 1_000_000.0).round() as i64
}

/// Converts a [`FingerprintMatch`] into a 0-15 point bonus: up to 10 points
/// for the fraction of fingerprinted tracks that matched, plus up to 5 for
/// average AcoustID confidence.
pub fn compute_fingerprint_score(fp_match: &FingerprintMatch, _local_track_count: usize) -> f64 {
    if fp_match.matched_tracks == 0 || fp_match.total_tracks == 0 {
        return 0.0;
    }

    let match_ratio = fp_match.matched_tracks as f64 / fp_match.total_tracks as f64;
    let base_score = match_ratio * 10.0;
    let confidence_bonus = fp_match.avg_score * 5.0;

    (base_score + confidence_bonus).clamp(0.0, 15.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(duration: Option<f64>) -> TrackInfo {
        TrackInfo { duration, ..Default::default() }
    }

    #[test]
    fn select_tracks_skips_short_ones() {
        let tracks = vec![track(Some(10.0)), track(Some(200.0)), track(Some(5.0))];
        let selected = select_tracks(&tracks, 5);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn select_tracks_distributes_evenly_when_over_max() {
        let tracks: Vec<TrackInfo> = (0..10).map(|_| track(Some(200.0))).collect();
        let selected = select_tracks(&tracks, 5);
        assert_eq!(selected.len(), 5);
    }

    #[test]
    fn compute_fingerprint_score_perfect_match_caps_at_fifteen() {
        let fp_match = FingerprintMatch { matched_tracks: 5, total_tracks: 5, avg_score: 1.0, ..Default::default() };
        assert_eq!(compute_fingerprint_score(&fp_match, 5), 15.0);
    }

    #[test]
    fn compute_fingerprint_score_no_matches_is_zero() {
        let fp_match = FingerprintMatch { matched_tracks: 0, total_tracks: 5, ..Default::default() };
        assert_eq!(compute_fingerprint_score(&fp_match, 5), 0.0);
    }

    #[test]
    fn aggregate_release_candidates_counts_distinct_tracks_per_release() {
        let fp1 = TrackFingerprint {
            path: "a".into(),
            duration: 200.0,
            fingerprint: "x".into(),
            acoustid_results: vec![AcoustIdResult { recording_id: "r1".into(), score: 0.9, release_ids: vec!["rel-1".into()], ..Default::default() }],
        };
        let fp2 = TrackFingerprint {
            path: "b".into(),
            duration: 200.0,
            fingerprint: "y".into(),
            acoustid_results: vec![AcoustIdResult { recording_id: "r2".into(), score: 0.8, release_ids: vec!["rel-1".into()], ..Default::default() }],
        };

        let matches = aggregate_release_candidates(&[fp1, fp2]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_tracks, 2);
        assert_eq!(matches[0].total_tracks, 2);
    }
}

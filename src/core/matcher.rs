use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::core::audio_reader::AlbumInfo;
use crate::core::clients::{MbRelease, MusicBrainzClient};
use crate::core::fingerprint::{compute_fingerprint_score, FingerprintMatch};
use crate::utils::normalizations::{normalize_for_matching, word_jaccard_similarity};

#[derive(Debug, Clone, Default)]
pub struct MatchScore {
    pub release: MbRelease,
    pub total_score: f64,
    pub text_score: f64,
    pub track_count_score: f64,
    pub duration_score: f64,
    pub media_score: f64,
    pub country_score: f64,
    pub year_score: f64,
    pub fingerprint_score: f64,
    pub penalty: f64,
    pub details: Vec<String>,
}

fn text_similarity(a: &str, b: &str) -> f64 {
    word_jaccard_similarity(&normalize_for_matching(a), &normalize_for_matching(b))
}

static DISC_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*[-–]\s*(CD|Disc|Disk)\s*\d+\s*$").unwrap());
static DISC_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*[\(\[](CD|Disc|Disk)\s*\d+[\)\]]").unwrap());
static EDITION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[\(\[](Legacy|Deluxe|Special|Limited|Remastered|Expanded|Anniversary|Bonus|Premium)\s*(Edition|Version|Remaster)?[\)\]]").unwrap()
});
static TRAILING_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*[-–]\s*$").unwrap());
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*[\(\[][^)\]]*[\)\]]").unwrap());

/// Strips disc indicators and edition suffixes before fuzzy comparison.
fn clean_album_name(name: &str) -> String {
    if name.is_empty() {
        return name.to_string();
    }
    let cleaned = DISC_SUFFIX.replace(name, "");
    let cleaned = DISC_BRACKET.replace(&cleaned, "");
    let cleaned = EDITION_SUFFIX.replace(&cleaned, "");
    let cleaned = TRAILING_DASH.replace(&cleaned, "");
    cleaned.trim().to_string()
}

/// Builds a sequence of (artist, album) search queries, from most specific
/// to most generic.
fn generate_search_variants(artist: &str, album: &str) -> Vec<(String, String)> {
    let mut variants = vec![(artist.to_string(), album.to_string())];

    let cleaned = clean_album_name(album);
    if cleaned != album {
        variants.push((artist.to_string(), cleaned.clone()));
    }

    let no_brackets = BRACKETED.replace(album, "");
    let no_brackets = TRAILING_DASH.replace(&no_brackets, "").trim().to_string();
    if !no_brackets.is_empty() && no_brackets != album && no_brackets != cleaned {
        variants.push((artist.to_string(), no_brackets));
    }

    variants
}

fn score_text_match(local: &AlbumInfo, release: &MbRelease) -> (f64, Vec<String>) {
    let mut details = Vec::new();

    let artist_sim = text_similarity(local.artist.as_deref().unwrap_or(""), &release.artist);
    let local_album = local.album.clone().unwrap_or_default();
    let mut album_sim = text_similarity(&local_album, &release.title);

    let cleaned_album = clean_album_name(&local_album);
    if cleaned_album != local_album {
        album_sim = album_sim.max(text_similarity(&cleaned_album, &release.title));
    }

    let artist_pts = artist_sim * 15.0;
    details.push(format!("Artist similarity: {:.0}% ({artist_pts:.1}/15)", artist_sim * 100.0));

    let album_pts = album_sim * 15.0;
    details.push(format!("Album similarity: {:.0}% ({album_pts:.1}/15)", album_sim * 100.0));

    (artist_pts + album_pts, details)
}

fn score_track_count(local: &AlbumInfo, release: &MbRelease) -> (f64, Vec<String>) {
    let local_count = local.track_count() as i64;
    let mb_count = release.track_count as i64;

    if local_count == 0 || mb_count == 0 {
        return (0.0, vec!["Track count unknown".to_string()]);
    }

    let diff = (local_count - mb_count).abs();
    let (score, detail) = match diff {
        0 => (20.0, format!("Track count exact match: {local_count}")),
        1 => (15.0, format!("Track count off by 1: local={local_count} vs MB={mb_count}")),
        2 => (10.0, format!("Track count off by 2: local={local_count} vs MB={mb_count}")),
        3..=4 => (5.0, format!("Track count off by {diff}: local={local_count} vs MB={mb_count}")),
        _ => (0.0, format!("Track count mismatch: local={local_count} vs MB={mb_count}")),
    };
    (score, vec![detail])
}

fn score_durations(local: &AlbumInfo, release: &MbRelease) -> (f64, Vec<String>) {
    let mut local_tracks: Vec<_> = local.tracks.iter().filter(|t| t.duration.is_some()).collect();
    local_tracks.sort_by_key(|t| (t.disc_number.unwrap_or(1), t.track_number.unwrap_or(0)));

    if local_tracks.is_empty() || release.tracks.is_empty() {
        return (0.0, vec!["No duration data available".to_string()]);
    }

    let mb_by_disc: std::collections::HashMap<(u32, u32), &crate::core::clients::MbTrack> =
        release.tracks.iter().filter(|t| t.disc_position > 0).map(|t| ((t.disc_number, t.disc_position), t)).collect();

    let mut mb_flat: Vec<&crate::core::clients::MbTrack> = release.tracks.iter().collect();
    mb_flat.sort_by_key(|t| t.position);

    let mut total_deviation = 0.0;
    let mut matched = 0usize;

    for (i, lt) in local_tracks.iter().enumerate() {
        let disc = lt.disc_number.unwrap_or(1);
        let trk = lt.track_number.unwrap_or(0);

        let mb_track = if trk > 0 { mb_by_disc.get(&(disc, trk)).copied() } else { None }.or_else(|| mb_flat.get(i).copied());

        let Some(mb_track) = mb_track else { continue };
        let (Some(local_dur), Some(mb_dur)) = (lt.duration, mb_track.duration_seconds()) else { continue };
        if mb_dur <= 0.0 {
            continue;
        }

        total_deviation += (local_dur - mb_dur).abs() / mb_dur;
        matched += 1;
    }

    if matched == 0 {
        return (0.0, vec!["No duration comparisons possible".to_string()]);
    }

    let avg_deviation = total_deviation / matched as f64;
    let score = if avg_deviation <= 0.02 {
        20.0
    } else if avg_deviation <= 0.05 {
        16.0
    } else if avg_deviation <= 0.10 {
        10.0
    } else if avg_deviation <= 0.20 {
        5.0
    } else {
        0.0
    };

    (score, vec![format!("Avg duration deviation: {:.1}% over {matched} tracks ({score:.0}/20)", avg_deviation * 100.0)])
}

fn score_media(release: &MbRelease, preferred_media: &[String]) -> (f64, Vec<String>) {
    let Some(media) = release.media.as_deref() else {
        return (5.0, vec!["Media format unknown, neutral score".to_string()]);
    };

    if let Some(idx) = preferred_media.iter().position(|m| m == media) {
        let pts = (10.0 - idx as f64 * 2.0).max(6.0);
        return (pts, vec![format!("Preferred media: {media} ({pts:.0}/10)")]);
    }

    (2.0, vec![format!("Non-preferred media: {media} (2/10)")])
}

fn score_country(release: &MbRelease, preferred_countries: &[String]) -> (f64, Vec<String>) {
    let Some(country) = release.country.as_deref() else {
        return (5.0, vec!["Country unknown, neutral score".to_string()]);
    };

    if let Some(idx) = preferred_countries.iter().position(|c| c == country) {
        let pts = (10.0 - idx as f64 * 1.5).max(5.0);
        return (pts, vec![format!("Preferred country: {country} ({pts:.0}/10)")]);
    }

    (2.0, vec![format!("Non-preferred country: {country} (2/10)")])
}

fn score_year(local: &AlbumInfo, release: &MbRelease) -> (f64, Vec<String>) {
    let mb_year = release.original_year.or(release.year);

    let (Some(local_year), Some(mb_year)) = (local.year, mb_year) else {
        return (5.0, vec!["Year unknown, neutral score".to_string()]);
    };

    let diff = (local_year as i64 - mb_year as i64).abs();
    let (score, detail) = match diff {
        0 => (10.0, format!("Year exact match: {mb_year}")),
        1 => (8.0, format!("Year off by 1: local={local_year} vs MB={mb_year}")),
        2..=3 => (5.0, format!("Year off by {diff}: local={local_year} vs MB={mb_year}")),
        _ => (2.0, format!("Year mismatch: local={local_year} vs MB={mb_year}")),
    };
    (score, vec![detail])
}

fn calculate_penalties(local: &AlbumInfo, release: &MbRelease) -> (f64, Vec<String>) {
    let mut penalty = 0.0;
    let mut details = Vec::new();

    let local_discs: HashSet<u32> = local.tracks.iter().map(|t| t.disc_number.unwrap_or(1)).collect();
    let local_is_single = local_discs.len() <= 1;
    let mb_is_multi = release.disc_count() > 1;
    let local_track_count = local.track_count() as u32;

    if local_is_single && mb_is_multi && release.track_count > local_track_count + 5 {
        penalty += 15.0;
        details.push(format!(
            "Multi-disc penalty: MB has {} tracks ({} discs) vs local {local_track_count} (-15)",
            release.track_count,
            release.disc_count()
        ));
    }

    if !local_is_single && !mb_is_multi {
        penalty += 10.0;
        details.push(format!("Disc mismatch: local has {} discs but MB is single-disc (-10)", local_discs.len()));
    }

    (penalty, details)
}

pub struct PreferenceWeights<'a> {
    pub preferred_media: &'a [String],
    pub preferred_countries: &'a [String],
}

/// Scores a single release against the local album.
pub fn score_release(
    local: &AlbumInfo,
    release: &MbRelease,
    fingerprint_matches: Option<&[FingerprintMatch]>,
    weights: &PreferenceWeights,
) -> MatchScore {
    let mut score = MatchScore { release: release.clone(), ..Default::default() };

    let (text_score, text_details) = score_text_match(local, release);
    score.text_score = text_score;
    score.details.extend(text_details);

    let (tc_score, tc_details) = score_track_count(local, release);
    score.track_count_score = tc_score;
    score.details.extend(tc_details);

    let (dur_score, dur_details) = score_durations(local, release);
    score.duration_score = dur_score;
    score.details.extend(dur_details);

    let (media_score, media_details) = score_media(release, weights.preferred_media);
    score.media_score = media_score;
    score.details.extend(media_details);

    let (country_score, country_details) = score_country(release, weights.preferred_countries);
    score.country_score = country_score;
    score.details.extend(country_details);

    let (year_score, year_details) = score_year(local, release);
    score.year_score = year_score;
    score.details.extend(year_details);

    if let Some(fp_matches) = fingerprint_matches {
        if let Some(fp_match) = fp_matches.iter().find(|m| m.release_id == release.release_id) {
            score.fingerprint_score = compute_fingerprint_score(fp_match, local.track_count());
            score.details.push(format!(
                "Fingerprint: {}/{} tracks, avg score {:.0}% ({:.1}/15)",
                fp_match.matched_tracks,
                fp_match.total_tracks,
                fp_match.avg_score * 100.0,
                score.fingerprint_score
            ));
        }
    }

    let (penalty, penalty_details) = calculate_penalties(local, release);
    score.penalty = penalty;
    score.details.extend(penalty_details);

    score.total_score = (score.text_score
        + score.track_count_score
        + score.duration_score
        + score.media_score
        + score.country_score
        + score.year_score
        + score.fingerprint_score
        - score.penalty)
        .clamp(0.0, 100.0);

    score
}

/// Text-search path: tries query variants until one returns results, pre-scores
/// all candidates using search-result data, then re-scores the top 5 with full
/// release details fetched.
pub fn find_matches(client: &MusicBrainzClient, local: &AlbumInfo, weights: &PreferenceWeights, limit: usize) -> Vec<MatchScore> {
    let artist = local.artist.clone().unwrap_or_else(|| "Unknown".to_string());
    let album = local.album.clone().unwrap_or_else(|| "Unknown".to_string());

    if local.artist.is_none() && local.album.is_none() {
        log::warn!("No artist/album metadata for {}, skipping match", local.path.display());
        return Vec::new();
    }

    log::info!("Matching: {artist} - {album} ({} tracks)", local.track_count());

    let variants = generate_search_variants(&artist, &album);
    let mut search_results = Vec::new();

    for (search_artist, search_album) in &variants {
        search_results = client.search_releases(search_artist, search_album, 15);
        if !search_results.is_empty() {
            if search_album != &album {
                log::info!("Found results with cleaned name: '{search_album}'");
            }
            break;
        }
        log::info!("No results for '{search_artist}' - '{search_album}', trying next variant...");
    }

    if search_results.is_empty() {
        log::warn!("No MusicBrainz results for {artist} - {album} (tried {} variants)", variants.len());
        return Vec::new();
    }

    let local_track_count = local.track_count() as u32;
    let filtered: Vec<MbRelease> = search_results
        .into_iter()
        .filter(|r| {
            if r.track_count == 0 {
                return true;
            }
            let diff = (r.track_count as i64 - local_track_count as i64).abs();
            diff <= local_track_count as i64
        })
        .collect();

    let mut pre_scored: Vec<MatchScore> = filtered.iter().map(|r| score_release(local, r, None, weights)).collect();
    pre_scored.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap());

    const TOP_N: usize = 5;
    let top_candidates: Vec<&MatchScore> = pre_scored.iter().take(TOP_N).collect();
    log::info!("Fetching details for top {} of {} candidates", top_candidates.len(), filtered.len());

    let mut detailed_scored: Vec<MatchScore> = top_candidates
        .into_iter()
        .filter_map(|m| client.get_release_details(&m.release.release_id))
        .map(|detailed| score_release(local, &detailed, None, weights))
        .collect();

    detailed_scored.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap());
    detailed_scored.truncate(limit);
    detailed_scored
}

/// Fingerprint fallback path for when text search yields nothing.
pub fn find_matches_by_fingerprint(
    client: &MusicBrainzClient,
    fp_matches: &[FingerprintMatch],
    local: &AlbumInfo,
    weights: &PreferenceWeights,
    limit: usize,
) -> Vec<MatchScore> {
    let mut scored: Vec<MatchScore> = fp_matches
        .iter()
        .take(5)
        .filter_map(|fp_match| client.get_release_details(&fp_match.release_id))
        .map(|release| score_release(local, &release, Some(fp_matches), weights))
        .collect();

    scored.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap());
    scored.truncate(limit);
    scored
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    AutoTag,
    NeedsReview,
    Skip,
}

/// Decides the tagging action for a confidence score.
pub fn decide_action(score: f64, auto_threshold: f64, review_threshold: f64) -> MatchDecision {
    if score >= auto_threshold {
        MatchDecision::AutoTag
    } else if score >= review_threshold {
        MatchDecision::NeedsReview
    } else {
        MatchDecision::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> PreferenceWeights<'static> {
        static MEDIA: &[String] = &[];
        static COUNTRIES: &[String] = &[];
        PreferenceWeights { preferred_media: MEDIA, preferred_countries: COUNTRIES }
    }

    #[test]
    fn clean_album_name_strips_disc_suffix() {
        assert_eq!(clean_album_name("Abbey Road - Disc 1"), "Abbey Road");
        assert_eq!(clean_album_name("Abbey Road (CD1)"), "Abbey Road");
    }

    #[test]
    fn clean_album_name_strips_edition_suffix() {
        assert_eq!(clean_album_name("Abbey Road (Deluxe Edition)"), "Abbey Road");
    }

    #[test]
    fn decide_action_thresholds() {
        assert_eq!(decide_action(90.0, 85.0, 50.0), MatchDecision::AutoTag);
        assert_eq!(decide_action(60.0, 85.0, 50.0), MatchDecision::NeedsReview);
        assert_eq!(decide_action(10.0, 85.0, 50.0), MatchDecision::Skip);
    }

    #[test]
    fn score_track_count_exact_match_is_twenty() {
        let local = AlbumInfo { tracks: vec![Default::default(); 10], ..Default::default() };
        let release = MbRelease { track_count: 10, ..Default::default() };
        let (score, _) = score_track_count(&local, &release);
        assert_eq!(score, 20.0);
    }

    #[test]
    fn score_media_unknown_is_neutral() {
        let release = MbRelease::default();
        let w = weights();
        let (score, _) = score_media(&release, w.preferred_media);
        assert_eq!(score, 5.0);
    }

    #[test]
    fn score_release_clamps_to_zero_minimum() {
        let local = AlbumInfo { tracks: vec![Default::default(); 1], ..Default::default() };
        let release = MbRelease { track_count: 20, ..Default::default() };
        let w = weights();
        let score = score_release(&local, &release, None, &w);
        assert!(score.total_score >= 0.0);
    }
}

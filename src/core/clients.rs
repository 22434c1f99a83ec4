use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;

const USER_AGENT: &str = "vinyl-custodian/1.0 (https://github.com/vinyl-custodian)";

/// Blocking rate limiter shared by every client below: a single mutex-guarded
/// timestamp of the last request, plus a fixed minimum interval. `wait()`
/// sleeps the calling thread (itself a worker thread, never the async
/// runtime) until the interval has elapsed, then stamps the new request time.
struct RateLimiter {
    last_request: Mutex<Instant>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(Instant::now() - min_interval),
            min_interval,
        }
    }

    fn wait(&self) {
        let mut last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            std::thread::sleep(self.min_interval - elapsed);
        }
        *last = Instant::now();
    }
}

fn http_client(timeout: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .expect("static client configuration is valid")
}

#[derive(Debug, Clone, Default)]
pub struct MbTrack {
    pub position: u32,
    pub disc_number: u32,
    pub disc_position: u32,
    pub title: String,
    pub duration_ms: Option<u64>,
    pub recording_id: Option<String>,
}

impl MbTrack {
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_ms.map(|ms| ms as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MbRelease {
    pub release_id: String,
    pub title: String,
    pub artist: String,
    pub year: Option<i32>,
    pub original_year: Option<i32>,
    pub track_count: u32,
    pub country: Option<String>,
    pub media: Option<String>,
    pub label: Option<String>,
    pub barcode: Option<String>,
    pub tracks: Vec<MbTrack>,
    pub release_group_id: Option<String>,
    pub genres: Vec<String>,
}

impl MbRelease {
    pub fn disc_count(&self) -> u32 {
        self.tracks.iter().map(|t| t.disc_number.max(1)).max().unwrap_or(1)
    }
}

/// MusicBrainz allows 1 request/second; 1.1s keeps a safety margin.
pub struct MusicBrainzClient {
    client: reqwest::blocking::Client,
    limiter: RateLimiter,
    base_url: String,
}

impl Default for MusicBrainzClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicBrainzClient {
    pub fn new() -> Self {
        Self {
            client: http_client(Duration::from_secs(15)),
            limiter: RateLimiter::new(Duration::from_millis(1100)),
            base_url: "https://musicbrainz.org/ws/2".to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(Duration::from_secs(15)),
            limiter: RateLimiter::new(Duration::from_millis(1)),
            base_url: base_url.into(),
        }
    }

    pub fn search_releases(&self, artist: &str, album: &str, limit: u32) -> Vec<MbRelease> {
        self.limiter.wait();

        let query = format!("artist:\"{artist}\" AND release:\"{album}\"");
        log::info!("MusicBrainz search: {query}");

        let resp = match self
            .client
            .get(format!("{}/release/", self.base_url))
            .query(&[("query", query.as_str()), ("limit", &limit.to_string()), ("fmt", "json")])
            .send()
        {
            Ok(resp) => resp,
            Err(err) => {
                log::error!("MusicBrainz search error: {err}");
                return Vec::new();
            }
        };

        let body: MbSearchResponse = match resp.error_for_status().and_then(|r| r.json()) {
            Ok(body) => body,
            Err(err) => {
                log::error!("MusicBrainz search error: {err}");
                return Vec::new();
            }
        };

        let releases: Vec<MbRelease> = body.releases.into_iter().map(MbSearchRelease::into_release).collect();
        log::info!("MusicBrainz found {} releases for '{artist}' - '{album}'", releases.len());
        releases
    }

    pub fn get_release_details(&self, release_id: &str) -> Option<MbRelease> {
        self.limiter.wait();

        let resp = match self
            .client
            .get(format!("{}/release/{release_id}", self.base_url))
            .query(&[("inc", "recordings+artist-credits+labels+release-groups+tags"), ("fmt", "json")])
            .send()
        {
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => return None,
            Ok(resp) => resp,
            Err(err) => {
                log::error!("MusicBrainz release lookup error for {release_id}: {err}");
                return None;
            }
        };

        match resp.error_for_status().and_then(|r| r.json::<MbReleaseDetail>()) {
            Ok(detail) => Some(detail.into_release()),
            Err(err) => {
                log::error!("MusicBrainz release lookup error for {release_id}: {err}");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MbSearchResponse {
    #[serde(rename = "releases", default)]
    releases: Vec<MbSearchRelease>,
}

#[derive(Debug, Deserialize)]
struct MbArtistCredit {
    name: Option<String>,
    joinphrase: Option<String>,
}

fn artist_credit_string(credits: &[MbArtistCredit]) -> String {
    let mut out = String::new();
    for credit in credits {
        out.push_str(credit.name.as_deref().unwrap_or(""));
        out.push_str(credit.joinphrase.as_deref().unwrap_or(""));
    }
    out.trim().to_string()
}

fn parse_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.get(0..4)).and_then(|y| y.parse().ok())
}

#[derive(Debug, Deserialize)]
struct MbMedium {
    format: Option<String>,
    #[serde(rename = "track-count", default)]
    track_count: u32,
}

#[derive(Debug, Deserialize)]
struct MbLabelInfo {
    label: Option<MbLabel>,
}

#[derive(Debug, Deserialize)]
struct MbLabel {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MbReleaseGroupRef {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MbSearchRelease {
    id: String,
    title: Option<String>,
    date: Option<String>,
    country: Option<String>,
    barcode: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(rename = "medium-list", default)]
    medium_list: Vec<MbMedium>,
    #[serde(rename = "label-info-list", default)]
    label_info_list: Vec<MbLabelInfo>,
    #[serde(rename = "release-group", default)]
    release_group: Option<MbReleaseGroupRef>,
}

impl MbSearchRelease {
    fn into_release(self) -> MbRelease {
        let mut track_count = 0;
        let mut media = None;
        for medium in &self.medium_list {
            track_count += medium.track_count;
            if media.is_none() {
                media = medium.format.clone();
            }
        }

        let label = self.label_info_list.iter().find_map(|li| li.label.as_ref().and_then(|l| l.name.clone()));

        MbRelease {
            release_id: self.id,
            title: self.title.unwrap_or_default(),
            artist: artist_credit_string(&self.artist_credit),
            year: parse_year(self.date.as_deref()),
            track_count,
            country: self.country,
            media,
            label,
            barcode: self.barcode,
            release_group_id: self.release_group.and_then(|rg| rg.id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct MbRecordingRef {
    id: Option<String>,
    title: Option<String>,
    length: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MbTrackRef {
    position: Option<String>,
    title: Option<String>,
    length: Option<String>,
    recording: Option<MbRecordingRef>,
}

#[derive(Debug, Deserialize)]
struct MbMediumDetail {
    format: Option<String>,
    #[serde(rename = "track-count", default)]
    track_count: u32,
    #[serde(rename = "track-list", default)]
    track_list: Vec<MbTrackRef>,
}

#[derive(Debug, Deserialize)]
struct MbTag {
    name: Option<String>,
    #[serde(default)]
    count: u32,
}

#[derive(Debug, Deserialize)]
struct MbReleaseGroupDetail {
    id: Option<String>,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    #[serde(rename = "tag-list", default)]
    tag_list: Vec<MbTag>,
}

#[derive(Debug, Deserialize)]
struct MbReleaseDetail {
    id: String,
    title: Option<String>,
    date: Option<String>,
    country: Option<String>,
    barcode: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(rename = "medium-list", default)]
    medium_list: Vec<MbMediumDetail>,
    #[serde(rename = "label-info-list", default)]
    label_info_list: Vec<MbLabelInfo>,
    #[serde(rename = "release-group", default)]
    release_group: Option<MbReleaseGroupDetail>,
    #[serde(rename = "tag-list", default)]
    tag_list: Vec<MbTag>,
}

impl MbReleaseDetail {
    fn into_release(self) -> MbRelease {
        let artist = artist_credit_string(&self.artist_credit);
        let year = parse_year(self.date.as_deref());
        let original_year = self.release_group.as_ref().and_then(|rg| parse_year(rg.first_release_date.as_deref()));

        let mut tracks = Vec::new();
        let mut media = None;
        let mut total_track_count = 0u32;

        for (disc_idx, medium) in self.medium_list.iter().enumerate() {
            if media.is_none() {
                media = medium.format.clone();
            }
            let disc_offset = total_track_count;
            for t in &medium.track_list {
                let recording = t.recording.as_ref();
                let duration_ms = t
                    .length
                    .as_deref()
                    .or_else(|| recording.and_then(|r| r.length.as_deref()))
                    .and_then(|s| s.parse::<u64>().ok());

                let disc_position: u32 = t.position.as_deref().and_then(|p| p.parse().ok()).unwrap_or(0);
                tracks.push(MbTrack {
                    position: disc_offset + disc_position,
                    disc_number: disc_idx as u32 + 1,
                    disc_position,
                    title: recording
                        .and_then(|r| r.title.clone())
                        .or_else(|| t.title.clone())
                        .unwrap_or_default(),
                    duration_ms,
                    recording_id: recording.and_then(|r| r.id.clone()),
                });
            }
            total_track_count += medium.track_count;
        }

        let label = self.label_info_list.iter().find_map(|li| li.label.as_ref().and_then(|l| l.name.clone()));

        let mut tag_totals: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        for tag in self.tag_list.iter().chain(self.release_group.as_ref().map(|rg| rg.tag_list.iter()).into_iter().flatten()) {
            if let Some(name) = tag.name.as_ref().map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
                *tag_totals.entry(name).or_insert(0) += tag.count;
            }
        }
        let mut genres: Vec<(String, u32)> = tag_totals.into_iter().collect();
        genres.sort_by(|a, b| b.1.cmp(&a.1));

        MbRelease {
            release_id: self.id,
            title: self.title.unwrap_or_default(),
            artist,
            year,
            original_year,
            track_count: total_track_count,
            country: self.country,
            media,
            label,
            barcode: self.barcode,
            tracks,
            release_group_id: self.release_group.and_then(|rg| rg.id),
            genres: genres.into_iter().map(|(name, _)| name).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AcoustIdResult {
    pub recording_id: String,
    pub score: f64,
    pub title: String,
    pub artist: String,
    pub release_ids: Vec<String>,
}

/// AcoustID allows 3 req/s; 0.35s keeps a safety margin.
pub struct AcoustIdClient {
    client: reqwest::blocking::Client,
    limiter: RateLimiter,
    api_key: String,
}

impl AcoustIdClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(Duration::from_secs(15)),
            limiter: RateLimiter::new(Duration::from_millis(350)),
            api_key: api_key.into(),
        }
    }

    pub fn lookup(&self, fingerprint: &str, duration_secs: f64) -> Vec<AcoustIdResult> {
        self.limiter.wait();

        let resp = match self
            .client
            .get("https://api.acoustid.org/v2/lookup")
            .query(&[
                ("client", self.api_key.as_str()),
                ("meta", "recordings+releases"),
                ("duration", &(duration_secs.round() as i64).to_string()),
                ("fingerprint", fingerprint),
                ("format", "json"),
            ])
            .send()
        {
            Ok(resp) => resp,
            Err(err) => {
                log::warn!("AcoustID lookup failed: {err}");
                return Vec::new();
            }
        };

        let body: AcoustIdResponse = match resp.error_for_status().and_then(|r| r.json()) {
            Ok(body) => body,
            Err(err) => {
                log::warn!("AcoustID lookup failed: {err}");
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for result in body.results {
            let score = result.score.unwrap_or(0.0);
            for recording in result.recordings.unwrap_or_default() {
                let Some(recording_id) = recording.id else { continue };

                let mut artist = String::new();
                for ac in recording.artists.unwrap_or_default() {
                    if !artist.is_empty() {
                        artist.push_str(ac.joinphrase.as_deref().unwrap_or(""));
                    }
                    artist.push_str(ac.name.as_deref().unwrap_or(""));
                }

                let release_ids = recording.releases.unwrap_or_default().into_iter().filter_map(|r| r.id).collect();

                results.push(AcoustIdResult {
                    recording_id,
                    score,
                    title: recording.title.unwrap_or_default(),
                    artist,
                    release_ids,
                });
            }
        }

        results
    }
}

#[derive(Debug, Deserialize)]
struct AcoustIdResponse {
    #[serde(default)]
    results: Vec<AcoustIdResultEntry>,
}

#[derive(Debug, Deserialize)]
struct AcoustIdResultEntry {
    score: Option<f64>,
    recordings: Option<Vec<AcoustIdRecording>>,
}

#[derive(Debug, Deserialize)]
struct AcoustIdRecording {
    id: Option<String>,
    title: Option<String>,
    artists: Option<Vec<MbArtistCredit>>,
    releases: Option<Vec<AcoustIdReleaseRef>>,
}

#[derive(Debug, Deserialize)]
struct AcoustIdReleaseRef {
    id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaaImage {
    pub thumbnail_url: String,
    pub full_url: String,
    pub label: String,
}

/// Cover Art Archive, iTunes, fanart.tv share a conservative default of
/// 0.34s (~3 req/s); none of them publish a stricter documented limit, but
/// none of them are MusicBrainz either, so the same courtesy interval applies.
pub struct CoverArtArchiveClient {
    client: reqwest::blocking::Client,
    limiter: RateLimiter,
    base_url: String,
}

impl Default for CoverArtArchiveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverArtArchiveClient {
    pub fn new() -> Self {
        Self {
            client: http_client(Duration::from_secs(15)),
            limiter: RateLimiter::new(Duration::from_millis(340)),
            base_url: "https://coverartarchive.org".to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(Duration::from_secs(15)),
            limiter: RateLimiter::new(Duration::from_millis(1)),
            base_url: base_url.into(),
        }
    }

    pub fn discover(&self, release_id: &str) -> Vec<CaaImage> {
        if release_id.is_empty() {
            return Vec::new();
        }
        self.limiter.wait();

        let resp = match self.client.get(format!("{}/release/{release_id}", self.base_url)).send() {
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => return Vec::new(),
            Ok(resp) => resp,
            Err(err) => {
                log::debug!("CAA discovery error for {release_id}: {err}");
                return Vec::new();
            }
        };

        let body: CaaResponse = match resp.error_for_status().and_then(|r| r.json()) {
            Ok(body) => body,
            Err(err) => {
                log::debug!("CAA discovery error for {release_id}: {err}");
                return Vec::new();
            }
        };

        body.images
            .into_iter()
            .filter(|img| !img.image.is_empty())
            .map(|img| {
                let thumb = img.thumbnails.get("250").or_else(|| img.thumbnails.get("small")).cloned().unwrap_or_else(|| img.image.clone());
                let mut label = if img.types.is_empty() { "Cover".to_string() } else { img.types.join(", ") };
                if let Some(comment) = img.comment.filter(|c| !c.is_empty()) {
                    label.push_str(&format!(" ({comment})"));
                }
                CaaImage { thumbnail_url: thumb, full_url: img.image, label }
            })
            .collect()
    }

    pub fn download(&self, url: &str) -> Option<Vec<u8>> {
        download_image(&self.client, url)
    }
}

#[derive(Debug, Deserialize)]
struct CaaResponse {
    #[serde(default)]
    images: Vec<CaaImageEntry>,
}

#[derive(Debug, Deserialize)]
struct CaaImageEntry {
    image: String,
    #[serde(default)]
    thumbnails: std::collections::HashMap<String, String>,
    #[serde(default)]
    types: Vec<String>,
    comment: Option<String>,
}

fn download_image(client: &reqwest::blocking::Client, url: &str) -> Option<Vec<u8>> {
    let resp = client.get(url).send().ok()?;
    let resp = resp.error_for_status().ok()?;
    let content_type = resp.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
    let bytes = resp.bytes().ok()?.to_vec();
    let looks_like_image = bytes.starts_with(&[0xff, 0xd8, 0xff]) || bytes.starts_with(b"\x89PNG");
    if !content_type.contains("image") && !looks_like_image {
        log::debug!("Not an image: {url} (content-type: {content_type})");
        return None;
    }
    Some(bytes)
}

#[derive(Debug, Clone)]
pub struct ITunesResult {
    pub thumbnail_url: String,
    pub full_url: String,
    pub label: String,
}

pub struct ITunesClient {
    client: reqwest::blocking::Client,
    limiter: RateLimiter,
}

impl Default for ITunesClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ITunesClient {
    pub fn new() -> Self {
        Self {
            client: http_client(Duration::from_secs(15)),
            limiter: RateLimiter::new(Duration::from_millis(340)),
        }
    }

    pub fn search(&self, artist: &str, album: &str) -> Vec<ITunesResult> {
        if artist.is_empty() && album.is_empty() {
            return Vec::new();
        }
        self.limiter.wait();

        let term = format!("{artist} {album}");
        let resp = match self
            .client
            .get("https://itunes.apple.com/search")
            .query(&[("term", term.as_str()), ("entity", "album"), ("limit", "5")])
            .send()
        {
            Ok(resp) => resp,
            Err(err) => {
                log::debug!("iTunes discovery error: {err}");
                return Vec::new();
            }
        };

        let body: ITunesResponse = match resp.error_for_status().and_then(|r| r.json()) {
            Ok(body) => body,
            Err(err) => {
                log::debug!("iTunes discovery error: {err}");
                return Vec::new();
            }
        };

        body.results
            .into_iter()
            .filter_map(|r| {
                let artwork = r.artwork_url_100.filter(|u| !u.is_empty())?;
                let thumb = artwork.replace("100x100bb", "250x250bb");
                let full = artwork.replace("100x100bb", "1400x1400bb");
                let label = format!("{} - {}", r.artist_name.unwrap_or_default(), r.collection_name.unwrap_or_default());
                Some(ITunesResult { thumbnail_url: thumb, full_url: full, label })
            })
            .collect()
    }

    pub fn download(&self, url: &str) -> Option<Vec<u8>> {
        download_image(&self.client, url)
    }
}

#[derive(Debug, Deserialize)]
struct ITunesResponse {
    #[serde(default)]
    results: Vec<ITunesResultEntry>,
}

#[derive(Debug, Deserialize)]
struct ITunesResultEntry {
    #[serde(rename = "artworkUrl100")]
    artwork_url_100: Option<String>,
    #[serde(rename = "artistName")]
    artist_name: Option<String>,
    #[serde(rename = "collectionName")]
    collection_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FanartTvResult {
    pub thumbnail_url: String,
    pub full_url: String,
    pub label: String,
}

pub struct FanartTvClient {
    client: reqwest::blocking::Client,
    limiter: RateLimiter,
    api_key: Option<String>,
}

impl FanartTvClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: http_client(Duration::from_secs(15)),
            limiter: RateLimiter::new(Duration::from_millis(340)),
            api_key,
        }
    }

    pub fn discover(&self, release_group_id: &str) -> Vec<FanartTvResult> {
        let Some(api_key) = self.api_key.as_ref().filter(|k| !k.is_empty()) else {
            return Vec::new();
        };
        if release_group_id.is_empty() {
            return Vec::new();
        }
        self.limiter.wait();

        let resp = match self
            .client
            .get(format!("https://webservice.fanart.tv/v3/music/albums/{release_group_id}"))
            .query(&[("api_key", api_key.as_str())])
            .send()
        {
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => return Vec::new(),
            Ok(resp) => resp,
            Err(err) => {
                log::debug!("fanart.tv discovery error: {err}");
                return Vec::new();
            }
        };

        let body: FanartTvResponse = match resp.error_for_status().and_then(|r| r.json()) {
            Ok(body) => body,
            Err(err) => {
                log::debug!("fanart.tv discovery error: {err}");
                return Vec::new();
            }
        };

        let mut options = Vec::new();
        for album in body.albums.into_values() {
            for (kind, label_base) in [("albumcover", "Cover"), ("cdart", "CD Art")] {
                let covers = match kind {
                    "albumcover" => &album.albumcover,
                    _ => &album.cdart,
                };
                for cover in covers {
                    if cover.url.is_empty() {
                        continue;
                    }
                    let thumb = cover.url.replace("/fanart/", "/preview/");
                    let mut label = label_base.to_string();
                    if let Some(lang) = cover.lang.as_ref().filter(|l| !l.is_empty()) {
                        label.push_str(&format!(" ({lang})"));
                    }
                    options.push(FanartTvResult { thumbnail_url: thumb, full_url: cover.url.clone(), label });
                }
            }
        }

        options
    }

    pub fn download(&self, url: &str) -> Option<Vec<u8>> {
        download_image(&self.client, url)
    }
}

#[derive(Debug, Deserialize)]
struct FanartTvResponse {
    #[serde(default)]
    albums: std::collections::HashMap<String, FanartTvAlbum>,
}

#[derive(Debug, Deserialize, Default)]
struct FanartTvAlbum {
    #[serde(default)]
    albumcover: Vec<FanartTvCover>,
    #[serde(default)]
    cdart: Vec<FanartTvCover>,
}

#[derive(Debug, Deserialize)]
struct FanartTvCover {
    url: String,
    lang: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LyricsResult {
    pub plain_lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
    pub instrumental: bool,
}

pub struct LrclibClient {
    client: reqwest::blocking::Client,
    limiter: RateLimiter,
}

impl Default for LrclibClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LrclibClient {
    pub fn new() -> Self {
        Self {
            client: http_client(Duration::from_secs(10)),
            limiter: RateLimiter::new(Duration::from_millis(340)),
        }
    }

    /// Exact match first, falling back to fuzzy search.
    pub fn fetch_lyrics(&self, artist: &str, title: &str, album: &str, duration_secs: u32) -> Option<LyricsResult> {
        if artist.is_empty() || title.is_empty() {
            return None;
        }

        if let Some(result) = self.exact_match(artist, title, album, duration_secs) {
            return Some(result);
        }
        self.fuzzy_search(artist, title)
    }

    fn exact_match(&self, artist: &str, title: &str, album: &str, duration_secs: u32) -> Option<LyricsResult> {
        self.limiter.wait();

        let mut query = vec![("artist_name", artist.to_string()), ("track_name", title.to_string())];
        if !album.is_empty() {
            query.push(("album_name", album.to_string()));
        }
        if duration_secs > 0 {
            query.push(("duration", duration_secs.to_string()));
        }

        let resp = match self.client.get("https://lrclib.net/api/get").query(&query).send() {
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => return None,
            Ok(resp) => resp,
            Err(err) => {
                log::debug!("LRCLIB exact match failed for {artist} - {title}: {err}");
                return None;
            }
        };

        resp.error_for_status()
            .ok()?
            .json::<LrclibTrack>()
            .ok()
            .map(LrclibTrack::into_result)
    }

    fn fuzzy_search(&self, artist: &str, title: &str) -> Option<LyricsResult> {
        self.limiter.wait();

        let q = format!("{artist} {title}");
        let resp = match self.client.get("https://lrclib.net/api/search").query(&[("q", q.as_str())]).send() {
            Ok(resp) => resp,
            Err(err) => {
                log::debug!("LRCLIB fuzzy search failed for {artist} - {title}: {err}");
                return None;
            }
        };

        let results: Vec<LrclibTrack> = resp.error_for_status().ok()?.json().ok()?;
        if results.is_empty() {
            return None;
        }

        for item in &results {
            let parsed = item.clone().into_result();
            if parsed.plain_lyrics.is_some() || parsed.synced_lyrics.is_some() {
                return Some(parsed);
            }
        }

        results.into_iter().next().map(LrclibTrack::into_result)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LrclibTrack {
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
    #[serde(default)]
    instrumental: bool,
}

impl LrclibTrack {
    fn into_result(self) -> LyricsResult {
        LyricsResult {
            plain_lyrics: self.plain_lyrics.filter(|s| !s.is_empty()),
            synced_lyrics: self.synced_lyrics.filter(|s| !s.is_empty()),
            instrumental: self.instrumental,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_does_not_block_first_call() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        limiter.wait();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn mb_release_disc_count_defaults_to_one() {
        let release = MbRelease::default();
        assert_eq!(release.disc_count(), 1);
    }

    #[test]
    fn lrclib_track_blank_fields_become_none() {
        let track = LrclibTrack { plain_lyrics: Some(String::new()), synced_lyrics: None, instrumental: false };
        let result = track.into_result();
        assert!(result.plain_lyrics.is_none());
    }

    #[test]
    fn musicbrainz_search_releases_parses_response() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/release/");
            then.status(200).json_body(serde_json::json!({
                "releases": [{
                    "id": "rel-1",
                    "title": "Moondance",
                    "date": "1970-02-01",
                    "country": "US",
                    "barcode": "123456",
                    "artist-credit": [{"name": "Van Morrison", "joinphrase": ""}],
                    "medium-list": [{"format": "CD", "track-count": 9}],
                    "label-info-list": [{"label": {"name": "Warner Bros."}}],
                    "release-group": {"id": "rg-1"}
                }]
            }));
        });

        let client = MusicBrainzClient::with_base_url(server.base_url());
        let releases = client.search_releases("Van Morrison", "Moondance", 5);

        mock.assert();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].title, "Moondance");
        assert_eq!(releases[0].artist, "Van Morrison");
        assert_eq!(releases[0].year, Some(1970));
        assert_eq!(releases[0].track_count, 9);
        assert_eq!(releases[0].label.as_deref(), Some("Warner Bros."));
        assert_eq!(releases[0].release_group_id.as_deref(), Some("rg-1"));
    }

    #[test]
    fn musicbrainz_get_release_details_not_found_returns_none() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/release/missing-id");
            then.status(404);
        });

        let client = MusicBrainzClient::with_base_url(server.base_url());
        assert!(client.get_release_details("missing-id").is_none());
        mock.assert();
    }

    #[test]
    fn cover_art_archive_discover_returns_images() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/release/rel-1");
            then.status(200).json_body(serde_json::json!({
                "images": [{
                    "image": "https://coverartarchive.org/rel-1/full.jpg",
                    "thumbnails": {"250": "https://coverartarchive.org/rel-1/thumb.jpg"},
                    "types": ["Front"],
                    "comment": ""
                }]
            }));
        });

        let client = CoverArtArchiveClient::with_base_url(server.base_url());
        let images = client.discover("rel-1");

        mock.assert();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].label, "Front");
        assert_eq!(images[0].thumbnail_url, "https://coverartarchive.org/rel-1/thumb.jpg");
    }

    #[test]
    fn cover_art_archive_discover_not_found_returns_empty() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/release/rel-missing");
            then.status(404);
        });

        let client = CoverArtArchiveClient::with_base_url(server.base_url());
        assert!(client.discover("rel-missing").is_empty());
        mock.assert();
    }
}

use std::path::{Path, PathBuf};

use crate::core::clients::{CoverArtArchiveClient, FanartTvClient, ITunesClient};
use crate::utils::normalizations::{normalize_for_matching, word_jaccard_similarity};

const COVER_FILE_NAMES: &[&str] = &[
    "cover.jpg", "cover.jpeg", "cover.png",
    "front.jpg", "front.jpeg", "front.png",
    "folder.jpg", "folder.jpeg", "folder.png",
    "albumart.jpg", "albumart.jpeg", "albumart.png",
    "album.jpg", "album.jpeg", "album.png",
];

fn text_match(a: &str, b: &str) -> f64 {
    word_jaccard_similarity(&normalize_for_matching(a), &normalize_for_matching(b))
}

/// Width and height in pixels, sniffed from raw bytes. Returns `(0, 0)`
/// when the format isn't recognized or the header is truncated.
pub fn image_dimensions(data: &[u8]) -> (u32, u32) {
    if data.len() >= 24 && data[..8] == [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'] {
        let w = u32::from_be_bytes(data[16..20].try_into().unwrap());
        let h = u32::from_be_bytes(data[20..24].try_into().unwrap());
        return (w, h);
    }

    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
        let mut i = 2usize;
        while i + 9 < data.len() {
            if data[i] != 0xFF {
                i += 1;
                continue;
            }
            let marker = data[i + 1];
            if matches!(marker, 0xC0 | 0xC1 | 0xC2) {
                let h = u16::from_be_bytes(data[i + 5..i + 7].try_into().unwrap());
                let w = u16::from_be_bytes(data[i + 7..i + 9].try_into().unwrap());
                return (w as u32, h as u32);
            }
            let length = u16::from_be_bytes(data[i + 2..i + 4].try_into().unwrap()) as usize;
            i += 2 + length;
        }
    }

    (0, 0)
}

fn meets_min_size(data: &[u8], min_size: u32) -> bool {
    let (w, h) = image_dimensions(data);
    if w == 0 || h == 0 {
        return true;
    }
    w.min(h) >= min_size
}

pub fn mime_from_bytes(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// A discovered-but-not-yet-downloaded artwork candidate, for presenting
/// choices to a reviewer.
#[derive(Debug, Clone)]
pub struct ArtworkOption {
    pub source: String,
    pub thumbnail_url: String,
    pub full_url: String,
    pub label: String,
}

pub fn discover_filesystem(folder_path: &Path) -> Vec<ArtworkOption> {
    let Ok(entries) = std::fs::read_dir(folder_path) else {
        return Vec::new();
    };

    const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
    const COVER_KEYWORDS: &[&str] = &["cover", "front", "folder", "albumart", "album", "artwork"];

    let mut options = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()) else { continue };
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(|s| s.to_lowercase()) else { continue };
        if !COVER_KEYWORDS.iter().any(|kw| stem.contains(kw)) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        options.push(ArtworkOption { source: "filesystem".to_string(), thumbnail_url: name.to_string(), full_url: name.to_string(), label: name.to_string() });
    }

    options
}

pub fn discover_caa(client: &CoverArtArchiveClient, release_id: &str) -> Vec<ArtworkOption> {
    client
        .discover(release_id)
        .into_iter()
        .map(|img| ArtworkOption { source: "caa".to_string(), thumbnail_url: img.thumbnail_url, full_url: img.full_url, label: img.label })
        .collect()
}

pub fn discover_itunes(client: &ITunesClient, artist: &str, album: &str) -> Vec<ArtworkOption> {
    client
        .search(artist, album)
        .into_iter()
        .map(|r| ArtworkOption { source: "itunes".to_string(), thumbnail_url: r.thumbnail_url, full_url: r.full_url, label: r.label })
        .collect()
}

pub fn discover_fanarttv(client: &FanartTvClient, release_group_id: &str) -> Vec<ArtworkOption> {
    client
        .discover(release_group_id)
        .into_iter()
        .map(|r| ArtworkOption { source: "fanarttv".to_string(), thumbnail_url: r.thumbnail_url, full_url: r.full_url, label: r.label })
        .collect()
}

/// Reads the first recognized cover file in `folder_path`, checked
/// case-insensitively.
pub fn fetch_from_filesystem(folder_path: &Path) -> Option<(Vec<u8>, String)> {
    let Ok(entries) = std::fs::read_dir(folder_path) else {
        return None;
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.file_name().and_then(|n| n.to_str()).map(|n| COVER_FILE_NAMES.contains(&n.to_lowercase().as_str())).unwrap_or(false))
        .collect();
    candidates.sort();

    for path in candidates {
        let Ok(data) = std::fs::read(&path) else { continue };
        if data.is_empty() {
            continue;
        }
        let mime = if path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("png")).unwrap_or(false) {
            "image/png"
        } else {
            "image/jpeg"
        };
        let (w, h) = image_dimensions(&data);
        log::info!("Found filesystem cover: {} ({w}x{h})", path.display());
        return Some((data, mime.to_string()));
    }

    None
}

pub fn fetch_from_itunes(client: &ITunesClient, artist: &str, album: &str, min_size: u32) -> Option<(Vec<u8>, String)> {
    let mut scored: Vec<(f64, crate::core::clients::ITunesResult)> =
        client.search(artist, album).into_iter().map(|r| (0.0, r)).collect();

    for (score, result) in &mut scored {
        let parts: Vec<&str> = result.label.splitn(2, " - ").collect();
        let (r_artist, r_album) = (parts.first().copied().unwrap_or(""), parts.get(1).copied().unwrap_or(""));
        *score = text_match(artist, r_artist) * 0.5 + text_match(album, r_album) * 0.5;
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

    for (score, result) in scored {
        if score < 0.3 {
            log::debug!("iTunes: skipping '{}' (score {score:.2})", result.label);
            continue;
        }

        let Some(data) = client.download(&result.full_url) else { continue };
        if meets_min_size(&data, min_size) {
            let (w, h) = image_dimensions(&data);
            log::info!("iTunes cover: {w}x{h} for '{artist}' - '{album}' (match: {score:.2})");
            return Some((data, "image/jpeg".to_string()));
        }
    }

    log::debug!("iTunes: no suitable artwork for '{artist}' - '{album}'");
    None
}

pub fn fetch_from_fanarttv(client: &FanartTvClient, release_group_id: &str, min_size: u32) -> Option<(Vec<u8>, String)> {
    for option in client.discover(release_group_id) {
        let Some(data) = client.download(&option.full_url) else { continue };
        if meets_min_size(&data, min_size) {
            let (w, h) = image_dimensions(&data);
            log::info!("fanart.tv cover: {w}x{h}");
            return Some((data, "image/jpeg".to_string()));
        }
    }

    log::debug!("fanart.tv: no suitable covers for {release_group_id}");
    None
}

pub fn fetch_from_coverart_archive(client: &CoverArtArchiveClient, release_id: &str, min_size: u32) -> Option<(Vec<u8>, String)> {
    if release_id.is_empty() {
        return None;
    }

    let data = client.download(&format!("https://coverartarchive.org/release/{release_id}/front"))?;
    if !meets_min_size(&data, min_size) {
        return None;
    }

    let (w, h) = image_dimensions(&data);
    let mime = mime_from_bytes(&data);
    log::info!("Cover Art Archive cover: {w}x{h}");
    Some((data, mime.to_string()))
}

pub struct ArtworkClients<'a> {
    pub caa: &'a CoverArtArchiveClient,
    pub itunes: &'a ITunesClient,
    pub fanarttv: &'a FanartTvClient,
}

pub struct ArtworkTarget<'a> {
    pub folder_path: &'a Path,
    pub artist: &'a str,
    pub album: &'a str,
    pub musicbrainz_release_id: &'a str,
    pub musicbrainz_release_group_id: &'a str,
}

/// Tries each configured source in order, returning the first image
/// meeting `min_size`.
pub fn fetch_artwork(clients: &ArtworkClients, target: &ArtworkTarget, source_priority: &[String], min_size: u32) -> Option<(Vec<u8>, String)> {
    for source_name in source_priority {
        log::debug!("Trying artwork source: {source_name}");
        let result = match source_name.as_str() {
            "filesystem" => fetch_from_filesystem(target.folder_path),
            "itunes" => fetch_from_itunes(clients.itunes, target.artist, target.album, min_size),
            "fanarttv" => fetch_from_fanarttv(clients.fanarttv, target.musicbrainz_release_group_id, min_size),
            "coverart" => fetch_from_coverart_archive(clients.caa, target.musicbrainz_release_id, min_size),
            _ => None,
        };
        if result.is_some() {
            log::info!("Artwork found from: {source_name}");
            return result;
        }
    }

    log::warn!("No artwork found for '{}' - '{}'", target.artist, target.album);
    None
}

/// Saves artwork as `albumart.{jpg,png}` in the album folder.
pub fn save_artwork_to_folder(folder_path: &Path, image_data: &[u8], mime: &str) -> std::io::Result<PathBuf> {
    let ext = if mime == "image/png" { "png" } else { "jpg" };
    let filepath = folder_path.join(format!("albumart.{ext}"));
    std::fs::write(&filepath, image_data)?;

    let (w, h) = image_dimensions(image_data);
    log::info!("Saved artwork: {} ({w}x{h}, {} bytes)", filepath.display(), image_data.len());
    Ok(filepath)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_dimensions_parsed_from_header() {
        let mut data = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
        data.extend_from_slice(&[0u8; 8]);
        data.extend_from_slice(&500u32.to_be_bytes());
        data.extend_from_slice(&600u32.to_be_bytes());
        assert_eq!(image_dimensions(&data), (500, 600));
    }

    #[test]
    fn jpeg_dimensions_parsed_from_sof_marker() {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xC0]);
        data.extend_from_slice(&17u16.to_be_bytes());
        data.push(8);
        data.extend_from_slice(&300u16.to_be_bytes());
        data.extend_from_slice(&400u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 10]);
        assert_eq!(image_dimensions(&data), (400, 300));
    }

    #[test]
    fn unrecognized_format_returns_zero() {
        assert_eq!(image_dimensions(b"not an image"), (0, 0));
    }

    #[test]
    fn meets_min_size_allows_undetermined_dimensions() {
        assert!(meets_min_size(b"not an image", 500));
    }

    #[test]
    fn mime_from_bytes_detects_png_signature() {
        assert_eq!(mime_from_bytes(b"\x89PNGrest"), "image/png");
        assert_eq!(mime_from_bytes(b"\xff\xd8\xffrest"), "image/jpeg");
    }
}

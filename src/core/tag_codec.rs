use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, ItemValue, Tag, TagExt, TagItem};

/// Uniform tag record shared across the four supported format families
/// (FLAC, MPEG Layer 3, MPEG-4/M4A, OGG Vorbis/Opus). Unset fields are
/// left untouched by `write_tags` (read-merge-write semantics); the sole
/// exception is the cover, which replaces the existing front picture
/// whenever `cover_data` is `Some`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagRecord {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub label: Option<String>,
    pub country: Option<String>,
    pub release_id: Option<String>,
    pub recording_id: Option<String>,
    pub cover_data: Option<Vec<u8>>,
    pub cover_mime: Option<String>,
}

impl TagRecord {
    pub fn with_cover(mut self, data: Vec<u8>, mime: impl Into<String>) -> Self {
        self.cover_data = Some(data);
        self.cover_mime = Some(mime.into());
        self
    }
}

fn country_key() -> ItemKey {
    ItemKey::Unknown("MUSICBRAINZ_ALBUMRELEASECOUNTRY".to_string())
}

fn label_key() -> ItemKey {
    ItemKey::Label
}

fn read_extra(tag: &Tag) -> (Option<String>, Option<String>, Option<String>, Option<String>) {
    let label = tag.get_string(&label_key()).map(str::to_string);
    let country = tag.get_string(&country_key()).map(str::to_string);
    let release_id = tag.get_string(&ItemKey::MusicBrainzReleaseId).map(str::to_string);
    let recording_id = tag.get_string(&ItemKey::MusicBrainzRecordingId).map(str::to_string);
    (label, country, release_id, recording_id)
}

fn u32_from_tag(tag: &Tag, key: ItemKey) -> Option<u32> {
    tag.get_string(&key).and_then(|s| s.split('/').next()).and_then(|s| s.trim().parse().ok())
}

fn front_cover(tag: &Tag) -> (Option<Vec<u8>>, Option<String>) {
    tag.pictures()
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| tag.pictures().first())
        .map(|p| (Some(p.data().to_vec()), Some(p.mime_type().map(|m| m.to_string()).unwrap_or_else(|| "image/jpeg".to_string()))))
        .unwrap_or((None, None))
}

/// Reads every field `write_tags` can write, used by the Backup Store (C7)
/// to capture a full pre-mutation snapshot.
pub fn read_tags(path: &Path) -> Result<TagRecord, super::CoreError> {
    let tagged = Probe::open(path)
        .map_err(|e| super::CoreError::CorruptFile(e.to_string()))?
        .read()
        .map_err(|e| super::CoreError::CorruptFile(e.to_string()))?;

    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Ok(TagRecord::default());
    };

    let (label, country, release_id, recording_id) = read_extra(tag);
    let (cover_data, cover_mime) = front_cover(tag);

    Ok(TagRecord {
        title: tag.title().map(|s| s.to_string()),
        artist: tag.artist().map(|s| s.to_string()),
        album_artist: tag.get_string(&ItemKey::AlbumArtist).map(str::to_string),
        album: tag.album().map(|s| s.to_string()),
        track_number: tag.track(),
        track_total: u32_from_tag(tag, ItemKey::TrackTotal),
        disc_number: tag.disk(),
        disc_total: u32_from_tag(tag, ItemKey::DiscTotal),
        year: tag.year(),
        genre: tag.genre().map(|s| s.to_string()),
        label,
        country,
        release_id,
        recording_id,
        cover_data,
        cover_mime,
    })
}

/// Read-merge-write: opens the file, overwrites only the fields present in
/// `record`, and saves. Cover is the one field that always replaces rather
/// than merges. Returns `Ok(false)` (not an error) when saving fails, to
/// match the "the caller sees a boolean success" contract.
pub fn write_tags(path: &Path, record: &TagRecord) -> Result<bool, super::CoreError> {
    let mut tagged = Probe::open(path)
        .map_err(|e| super::CoreError::CorruptFile(e.to_string()))?
        .read()
        .map_err(|e| super::CoreError::CorruptFile(e.to_string()))?;

    let tag = match tagged.primary_tag_mut() {
        Some(tag) => tag,
        None => {
            let tag_type = tagged.primary_tag_type();
            tagged.insert_tag(Tag::new(tag_type));
            tagged.primary_tag_mut().expect("tag was just inserted")
        }
    };

    if let Some(title) = &record.title {
        tag.set_title(title.clone());
    }
    if let Some(artist) = &record.artist {
        tag.set_artist(artist.clone());
    }
    if let Some(album_artist) = &record.album_artist {
        tag.insert(TagItem::new(ItemKey::AlbumArtist, ItemValue::Text(album_artist.clone())));
    }
    if let Some(album) = &record.album {
        tag.set_album(album.clone());
    }
    if let Some(n) = record.track_number {
        tag.set_track(n);
    }
    if let Some(n) = record.track_total {
        tag.set_track_total(n);
    }
    if let Some(n) = record.disc_number {
        tag.set_disk(n);
    }
    if let Some(n) = record.disc_total {
        tag.set_disk_total(n);
    }
    if let Some(y) = record.year {
        tag.set_year(y);
    }
    if let Some(genre) = &record.genre {
        tag.set_genre(genre.clone());
    }
    if let Some(label) = &record.label {
        tag.insert(TagItem::new(label_key(), ItemValue::Text(label.clone())));
    }
    if let Some(country) = &record.country {
        tag.insert(TagItem::new(country_key(), ItemValue::Text(country.clone())));
    }
    if let Some(release_id) = &record.release_id {
        tag.insert(TagItem::new(ItemKey::MusicBrainzReleaseId, ItemValue::Text(release_id.clone())));
    }
    if let Some(recording_id) = &record.recording_id {
        tag.insert(TagItem::new(ItemKey::MusicBrainzRecordingId, ItemValue::Text(recording_id.clone())));
    }

    if let Some(data) = &record.cover_data {
        let mime = match record.cover_mime.as_deref() {
            Some("image/png") => MimeType::Png,
            _ => MimeType::Jpeg,
        };
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(Picture::new_unchecked(PictureType::CoverFront, Some(mime), None, data.clone()));
    }

    match tag.save_to_path(path, WriteOptions::default()) {
        Ok(()) => Ok(true),
        Err(err) => {
            log::warn!("Failed to write tags to {}: {}", path.display(), err);
            Ok(false)
        }
    }
}

/// Writer for the lyrics supplement: plain lyrics go to the format's
/// canonical lyrics tag, synced LRC text (when present) is written
/// alongside as an unsynchronized-lyrics-style freeform field.
pub fn write_lyrics(path: &Path, plain: Option<&str>, synced: Option<&str>) -> Result<bool, super::CoreError> {
    let mut tagged = Probe::open(path)
        .map_err(|e| super::CoreError::CorruptFile(e.to_string()))?
        .read()
        .map_err(|e| super::CoreError::CorruptFile(e.to_string()))?;

    let tag = match tagged.primary_tag_mut() {
        Some(tag) => tag,
        None => {
            let tag_type = tagged.primary_tag_type();
            tagged.insert_tag(Tag::new(tag_type));
            tagged.primary_tag_mut().expect("tag was just inserted")
        }
    };

    if let Some(plain) = plain {
        tag.insert(TagItem::new(ItemKey::Lyrics, ItemValue::Text(plain.to_string())));
    }
    if let Some(synced) = synced {
        tag.insert(TagItem::new(ItemKey::Unknown("SYNCED_LYRICS".to_string()), ItemValue::Text(synced.to_string())));
    }

    match tag.save_to_path(path, WriteOptions::default()) {
        Ok(()) => Ok(true),
        Err(err) => {
            log::warn!("Failed to write lyrics to {}: {}", path.display(), err);
            Ok(false)
        }
    }
}

/// ReplayGain tag-writing side only; the analyzer that produces these
/// gain/peak values is a separate pluggable component. Writes the canonical
/// Vorbis-comment-style `REPLAYGAIN_*` keys, which lofty maps onto the
/// equivalent ID3/MP4/Vorbis location for each format family.
pub fn write_replaygain(
    path: &Path,
    track_gain: Option<f64>,
    track_peak: Option<f64>,
    album_gain: Option<f64>,
    album_peak: Option<f64>,
) -> Result<bool, super::CoreError> {
    let mut tagged = Probe::open(path)
        .map_err(|e| super::CoreError::CorruptFile(e.to_string()))?
        .read()
        .map_err(|e| super::CoreError::CorruptFile(e.to_string()))?;

    let tag = match tagged.primary_tag_mut() {
        Some(tag) => tag,
        None => {
            let tag_type = tagged.primary_tag_type();
            tagged.insert_tag(Tag::new(tag_type));
            tagged.primary_tag_mut().expect("tag was just inserted")
        }
    };

    let set = |tag: &mut Tag, key: &str, value: Option<f64>, suffix: &str| {
        if let Some(v) = value {
            tag.insert(TagItem::new(
                ItemKey::Unknown(key.to_string()),
                ItemValue::Text(format!("{v:.2} {suffix}")),
            ));
        }
    };

    set(tag, "REPLAYGAIN_TRACK_GAIN", track_gain, "dB");
    set(tag, "REPLAYGAIN_TRACK_PEAK", track_peak, "");
    set(tag, "REPLAYGAIN_ALBUM_GAIN", album_gain, "dB");
    set(tag, "REPLAYGAIN_ALBUM_PEAK", album_peak, "");

    match tag.save_to_path(path, WriteOptions::default()) {
        Ok(()) => Ok(true),
        Err(err) => {
            log::warn!("Failed to write ReplayGain tags to {}: {}", path.display(), err);
            Ok(false)
        }
    }
}

/// Converts a standard ReplayGain dB gain (referenced to `rg_reference`
/// LUFS) into Opus's Q7.8 fixed-point R128 gain, referenced to -23 LUFS.
pub fn replaygain_to_r128(gain_db: f64, rg_reference: f64) -> i32 {
    ((gain_db + (rg_reference - (-23.0))) * 256.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaygain_to_r128_matches_reference_offset() {
        // a track already mastered to -23 LUFS (Opus's native reference)
        // carries its dB gain straight across once scaled into Q7.8.
        assert_eq!(replaygain_to_r128(0.0, -23.0), 0);
        assert_eq!(replaygain_to_r128(1.0, -23.0), 256);
    }

    #[test]
    fn replaygain_to_r128_applies_reference_offset() {
        // a -18 LUFS reference track needs the 5 dB gap folded in before scaling.
        let r128 = replaygain_to_r128(0.0, -18.0);
        assert_eq!(r128, 1280);
    }

    #[test]
    fn tag_record_with_cover_sets_both_fields() {
        let record = TagRecord::default().with_cover(vec![1, 2, 3], "image/png");
        assert_eq!(record.cover_data, Some(vec![1, 2, 3]));
        assert_eq!(record.cover_mime.as_deref(), Some("image/png"));
    }
}

use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::core::CoreError;

/// Measured loudness for one track: RMS level in dBFS and the linear sample
/// peak (0.0-1.0), the two inputs ReplayGain needs.
#[derive(Debug, Clone, Copy)]
pub struct TrackLoudness {
    pub loudness_dbfs: f64,
    pub peak: f64,
}

/// Decodes `path` with symphonia and measures RMS level and sample peak
/// across every channel. This is a minimal stand-in for a full EBU R128
/// analyzer (gating, channel weighting); good enough to derive a ReplayGain
/// value relative to a reference loudness.
pub fn analyze_track(path: &Path) -> Result<TrackLoudness, CoreError> {
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

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CoreError::UnsupportedFormat(e.to_string()))?;

    let mut sum_squares = 0.0f64;
    let mut sample_count = 0u64;
    let mut peak = 0.0f64;

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
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        for &sample in sample_buf.samples() {
            let s = sample as f64;
            sum_squares += s * s;
            peak = peak.max(s.abs());
            sample_count += 1;
        }
    }

    if sample_count == 0 {
        return Err(CoreError::CorruptFile("no audio samples decoded".to_string()));
    }

    let rms = (sum_squares / sample_count as f64).sqrt();
    let loudness_dbfs = if rms > 0.0 { 20.0 * rms.log10() } else { -100.0 };

    Ok(TrackLoudness { loudness_dbfs, peak })
}

/// Per-track ReplayGain value relative to `reference_loudness` (LUFS-ish
/// dB reference, default -18 per spec).
pub fn track_gain(loudness: &TrackLoudness, reference_loudness: f64) -> f64 {
    reference_loudness - loudness.loudness_dbfs
}

/// Album gain: average the tracks' power (not their dB values) before
/// converting back to dB, so louder tracks carry proportionally more weight.
pub fn album_gain(tracks: &[TrackLoudness], reference_loudness: f64) -> f64 {
    if tracks.is_empty() {
        return 0.0;
    }
    let mean_power = tracks.iter().map(|t| 10f64.powf(t.loudness_dbfs / 10.0)).sum::<f64>() / tracks.len() as f64;
    let album_loudness = if mean_power > 0.0 { 10.0 * mean_power.log10() } else { -100.0 };
    reference_loudness - album_loudness
}

/// Album peak is the loudest sample peak across every track.
pub fn album_peak(tracks: &[TrackLoudness]) -> f64 {
    tracks.iter().map(|t| t.peak).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_gain_is_zero_when_already_at_reference() {
        let loudness = TrackLoudness { loudness_dbfs: -18.0, peak: 0.5 };
        assert_eq!(track_gain(&loudness, -18.0), 0.0);
    }

    #[test]
    fn track_gain_is_positive_for_a_quiet_track() {
        let loudness = TrackLoudness { loudness_dbfs: -24.0, peak: 0.3 };
        assert_eq!(track_gain(&loudness, -18.0), 6.0);
    }

    #[test]
    fn album_peak_is_the_loudest_track_peak() {
        let tracks = vec![
            TrackLoudness { loudness_dbfs: -18.0, peak: 0.4 },
            TrackLoudness { loudness_dbfs: -20.0, peak: 0.9 },
        ];
        assert_eq!(album_peak(&tracks), 0.9);
    }

    #[test]
    fn album_gain_of_identical_tracks_matches_track_gain() {
        let tracks = vec![TrackLoudness { loudness_dbfs: -20.0, peak: 0.5 }; 3];
        let gain = album_gain(&tracks, -18.0);
        assert!((gain - 2.0).abs() < 1e-9);
    }
}

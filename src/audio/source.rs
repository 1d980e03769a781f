//! Audio file decoding and WAV export.
//!
//! [`load`] decodes any container/codec symphonia understands (WAV, FLAC,
//! MP3, Ogg/Vorbis, AAC/MP4), downmixes to mono and resamples to the target
//! rate with the fixed sinc resampler from [`super::resample`].
//!
//! Error policy: a file symphonia cannot identify or has no decoder for is
//! [`LoadError::UnsupportedFormat`]; a recognised file whose packets fail to
//! decode, or that decodes to nothing, is [`LoadError::CorruptFile`].  No
//! retries are attempted since source files are static.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::resample::{resample_to, stereo_to_mono, ResampleError};
use super::WaveformBuffer;

/// Codec priming and padding can leave a compressed stream's declared frame
/// count up to about one packet above what decodes.
const TRUNCATION_SLACK_FRAMES: u64 = 2_048;

// ---------------------------------------------------------------------------
// LoadError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoadError {
    /// File could not be opened.
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No format reader or decoder for this file.
    #[error("unsupported audio format in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// Truncated or invalid data.
    #[error("corrupt audio file {path}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    #[error("resampling {path} failed: {source}")]
    Resample {
        path: PathBuf,
        #[source]
        source: ResampleError,
    },

    /// WAV export failed.
    #[error("cannot write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Raw decode result before resampling.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// load
// ---------------------------------------------------------------------------

/// Decode `path`, downmix to mono and resample to `target_rate` Hz.
pub fn load(path: impl AsRef<Path>, target_rate: u32) -> Result<WaveformBuffer, LoadError> {
    let path = path.as_ref();
    let decoded = decode(path)?;

    let mono = stereo_to_mono(&decoded.samples, decoded.channels);
    let samples = resample_to(&mono, decoded.sample_rate, target_rate).map_err(|source| {
        LoadError::Resample {
            path: path.to_path_buf(),
            source,
        }
    })?;

    log::debug!(
        "loaded {} ({} Hz, {} ch) -> {} samples @ {} Hz",
        path.display(),
        decoded.sample_rate,
        decoded.channels,
        samples.len(),
        target_rate
    );

    Ok(WaveformBuffer::new(samples, target_rate))
}

/// Decode the first audio track of `path` to interleaved `f32`.
pub fn decode(path: &Path) -> Result<DecodedAudio, LoadError> {
    let unsupported = |reason: String| LoadError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason,
    };
    let corrupt = |reason: String| LoadError::CorruptFile {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => unsupported(what.to_string()),
            other => corrupt(other.to_string()),
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported("no audio track".into()))?;
    let track_id = track.id;
    let declared_frames = track.codec_params.n_frames;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(corrupt(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| corrupt(format!("packet at ts {}: {e}", packet.ts())))?;
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(corrupt("no decodable audio".into()));
    }

    // The stream ends with UnexpectedEof both at a clean end and when the
    // data is cut short; only the header's frame count tells them apart.
    let decoded_frames = (samples.len() / channels as usize) as u64;
    if let Some(declared) = declared_frames {
        if decoded_frames + TRUNCATION_SLACK_FRAMES < declared {
            return Err(corrupt(format!(
                "truncated: decoded {decoded_frames} of {declared} frames"
            )));
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

// ---------------------------------------------------------------------------
// save_wav
// ---------------------------------------------------------------------------

/// Write `buffer` as a mono 32-bit float WAV, creating parent directories.
pub fn save_wav(buffer: &WaveformBuffer, path: impl AsRef<Path>) -> Result<(), LoadError> {
    let path = path.as_ref();
    let write_err = |reason: String| LoadError::Write {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| write_err(e.to_string()))?;
    for &s in buffer.samples() {
        writer
            .write_sample(s)
            .map_err(|e| write_err(e.to_string()))?;
    }
    writer.finalize().map_err(|e| write_err(e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_pcm16(path: &Path, rate: u32, channels: u16, frames: &[Vec<f32>]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in frame {
                w.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
        }
        w.finalize().unwrap();
    }

    #[test]
    fn loads_mono_wav_at_native_rate() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("mono.wav");
        let frames: Vec<Vec<f32>> = (0..1_600).map(|i| vec![(i as f32 * 0.01).sin() * 0.5]).collect();
        write_pcm16(&path, 16_000, 1, &frames);

        let buf = load(&path, 16_000).expect("load");
        assert_eq!(buf.sample_rate(), 16_000);
        assert_eq!(buf.len(), 1_600);
        assert!((buf.samples()[100] - frames[100][0]).abs() < 1e-3);
    }

    #[test]
    fn stereo_is_downmixed_and_resampled() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("stereo.wav");
        let frames: Vec<Vec<f32>> = (0..44_100).map(|_| vec![0.5, 0.1]).collect();
        write_pcm16(&path, 44_100, 2, &frames);

        let buf = load(&path, 16_000).expect("load");
        assert_eq!(buf.len(), 16_000);
        // DC level (0.5 + 0.1) / 2 away from the filter edges
        assert!((buf.samples()[8_000] - 0.3).abs() < 1e-2, "{}", buf.samples()[8_000]);
    }

    #[test]
    fn repeated_loads_are_identical() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("tone.wav");
        let frames: Vec<Vec<f32>> = (0..22_050).map(|i| vec![(i as f32 * 0.07).sin() * 0.4]).collect();
        write_pcm16(&path, 22_050, 1, &frames);

        let a = load(&path, 16_000).unwrap();
        let b = load(&path, 16_000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a RIFF header, just text").unwrap();

        let err = load(&path, 16_000).unwrap_err();
        assert!(
            matches!(err, LoadError::UnsupportedFormat { .. } | LoadError::CorruptFile { .. }),
            "{err}"
        );
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("cut.wav");
        let frames: Vec<Vec<f32>> = (0..32_000).map(|i| vec![(i as f32 * 0.03).sin() * 0.5]).collect();
        write_pcm16(&path, 16_000, 1, &frames);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let err = load(&path, 16_000).unwrap_err();
        assert!(matches!(err, LoadError::CorruptFile { .. }), "{err}");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().expect("temp dir");
        let err = load(dir.path().join("absent.flac"), 16_000).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "{err}");
    }

    #[test]
    fn save_then_load_preserves_samples() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("out.wav");
        let buf = WaveformBuffer::new((0..800).map(|i| (i as f32 * 0.02).cos() * 0.3).collect(), 16_000);

        save_wav(&buf, &path).expect("save");
        let loaded = load(&path, 16_000).expect("load");
        assert_eq!(loaded.len(), buf.len());
        for (a, b) in loaded.samples().iter().zip(buf.samples()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}

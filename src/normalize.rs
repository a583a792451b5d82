//! Audio normalization: arbitrary media file → canonical mono 16 kHz waveform.
//!
//! Responsibilities:
//! - Probe the input container with Symphonia and pick a decodable audio track
//! - Decode packet-by-packet, skipping corrupt frames
//! - Downmix to mono and resample to [`TARGET_SAMPLE_RATE`] when needed
//! - Persist the result as `audio.wav` in the working directory
//!
//! Normalization is idempotent: if the cached waveform already exists for this
//! input, the decode is skipped entirely. All failures on this path are
//! [`Error::MediaRead`] and fatal to the run.

use std::fs::File;
use std::path::{Path, PathBuf};

use rubato::{Resampler, SincFixedIn, WindowFunction};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::wav::{self, TARGET_SAMPLE_RATE, Waveform};
use crate::workdir::WorkDir;

/// Ensure a normalized waveform exists for `input`, returning its path.
///
/// Reuses the cached `audio.wav` when present so re-runs never pay for
/// decoding twice.
pub fn ensure_normalized(input: &Path, workdir: &WorkDir) -> Result<PathBuf> {
    let out = workdir.waveform_path();
    if out.exists() {
        debug!(path = %out.display(), "reusing cached normalized waveform");
        return Ok(out);
    }

    let waveform = decode_media(input)?;
    wav::write_waveform(&out, &waveform.samples, waveform.sample_rate)?;
    info!(
        path = %out.display(),
        duration_ms = waveform.duration_ms(),
        "normalized input media"
    );

    Ok(out)
}

/// Decode `input` into a mono waveform at [`TARGET_SAMPLE_RATE`].
pub fn decode_media(input: &Path) -> Result<Waveform> {
    let file = File::open(input)
        .map_err(|err| Error::MediaRead(format!("cannot open '{}': {err}", input.display())))?;

    let (mut format, track) = probe_input(file, input)?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| Error::MediaRead(format!("unsupported audio codec: {err}")))?;

    let mut resampler = MonoResampler::new(track_sample_rate(&track)?)?;
    let mut scratch: Option<SampleBuffer<f32>> = None;
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // Symphonia signals end-of-stream through an IO error.
            Err(SymphoniaError::IoError(_)) => break,
            Err(err) => return Err(Error::MediaRead(format!("failed reading packet: {err}"))),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let Some(mono) = decode_packet_to_mono(&mut decoder, &packet, &mut scratch)? else {
            continue;
        };
        resampler.push(&mono, &mut samples)?;
    }

    resampler.finish(&mut samples)?;

    if samples.is_empty() {
        return Err(Error::MediaRead(format!(
            "'{}' contained no decodable audio",
            input.display()
        )));
    }

    Ok(Waveform::new(samples, TARGET_SAMPLE_RATE))
}

/// Probe the container and pick a default audio track.
///
/// Track selection policy:
/// - choose the first track that looks decodable (codec != NULL)
/// - and has a known sample rate (required for resampling decisions downstream)
fn probe_input(file: File, input: &Path) -> Result<(Box<dyn FormatReader>, Track)> {
    let mss_opts = MediaSourceStreamOptions {
        // Symphonia expects a power-of-two buffer > 32KiB for good probing behavior.
        buffer_len: 256 * 1024,
    };
    let mss = MediaSourceStream::new(Box::new(file), mss_opts);

    // The extension hint improves probe accuracy for ambiguous containers.
    let mut hint = Hint::new();
    if let Some(ext) = input.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| {
            Error::MediaRead(format!("failed to probe '{}': {err}", input.display()))
        })?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .cloned()
        .ok_or_else(|| Error::MediaRead(format!("no audio track found in '{}'", input.display())))?;

    Ok((format, track))
}

fn track_sample_rate(track: &Track) -> Result<u32> {
    track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::MediaRead("selected track has no sample rate".into()))
}

/// Decode one packet and downmix it to mono.
///
/// Returns `Ok(None)` for recoverable conditions (corrupt frame, decoder-level
/// IO end) so the packet loop can keep going.
fn decode_packet_to_mono(
    decoder: &mut Box<dyn Decoder>,
    packet: &symphonia::core::formats::Packet,
    scratch: &mut Option<SampleBuffer<f32>>,
) -> Result<Option<Vec<f32>>> {
    let decoded = match decoder.decode(packet) {
        Ok(decoded) => decoded,
        // Corrupt frame; decoding can continue on the next packet.
        Err(SymphoniaError::DecodeError(_)) => return Ok(None),
        Err(SymphoniaError::IoError(_)) => return Ok(None),
        Err(err) => return Err(Error::MediaRead(format!("decoder failure: {err}"))),
    };

    let buf = ensure_scratch(&decoded, scratch);
    buf.copy_interleaved_ref(decoded.clone());

    let channels = decoded.spec().channels.count();
    if channels == 0 {
        return Err(Error::MediaRead("decoded audio had zero channels".into()));
    }

    Ok(Some(downmix_to_mono(buf.samples(), channels)))
}

fn ensure_scratch<'a>(
    decoded: &AudioBufferRef<'_>,
    scratch: &'a mut Option<SampleBuffer<f32>>,
) -> &'a mut SampleBuffer<f32> {
    scratch.get_or_insert_with(|| {
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;
        SampleBuffer::<f32>::new(duration, spec)
    })
}

/// Downmix interleaved samples into mono by averaging channels.
///
/// Policy: equal-weight average across channels (simple, predictable).
fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }

    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);

    for frame in 0..frames {
        let base = frame * channels;
        let sum: f32 = interleaved[base..base + channels].iter().sum();
        mono.push(sum / channels as f32);
    }

    mono
}

/// Accumulating mono resampler from a source rate to [`TARGET_SAMPLE_RATE`].
///
/// When the source is already at the target rate this is a passthrough.
/// Otherwise samples buffer until a full rubato input block is available; the
/// final partial block is zero-padded at `finish` (a few milliseconds of
/// trailing silence, harmless for subtitle timing).
struct MonoResampler {
    inner: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
}

impl MonoResampler {
    fn new(src_rate: u32) -> Result<Self> {
        if src_rate == TARGET_SAMPLE_RATE {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
            });
        }

        // Block size fed to rubato per `process()` call. Larger blocks favor
        // throughput; this is a batch pipeline so latency is irrelevant.
        let block_frames = 2048;

        let inner = SincFixedIn::<f32>::new(
            TARGET_SAMPLE_RATE as f64 / src_rate as f64,
            2.0,
            rubato::SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: rubato::SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            block_frames,
            1, // mono
        )
        .map_err(|err| Error::MediaRead(format!("failed to init resampler: {err}")))?;

        Ok(Self {
            inner: Some(inner),
            pending: Vec::new(),
        })
    }

    fn push(&mut self, mono: &[f32], out: &mut Vec<f32>) -> Result<()> {
        let Some(resampler) = self.inner.as_mut() else {
            out.extend_from_slice(mono);
            return Ok(());
        };

        self.pending.extend_from_slice(mono);

        let block_frames = resampler.input_frames_max();
        while self.pending.len() >= block_frames {
            let block: Vec<f32> = self.pending.drain(..block_frames).collect();
            let resampled = resampler
                .process(&[block], None)
                .map_err(|err| Error::MediaRead(format!("resampler process failed: {err}")))?;
            out.extend_from_slice(&resampled[0]);
        }

        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<f32>) -> Result<()> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(());
        };

        if self.pending.is_empty() {
            return Ok(());
        }

        // rubato expects exact block sizes; pad the tail with zeros.
        let block_frames = resampler.input_frames_max();
        self.pending.resize(block_frames, 0.0);

        let block: Vec<f32> = self.pending.drain(..).collect();
        let resampled = resampler
            .process(&[block], None)
            .map_err(|err| Error::MediaRead(format!("resampler process failed: {err}")))?;
        out.extend_from_slice(&resampled[0]);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_single_channel_is_identity() {
        let input = vec![0.0, 1.0, -1.0];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn downmix_averages_channels() {
        // Two frames of stereo: (L=1, R=3), (L=-1, R=1) => mono: 2, 0
        let interleaved = vec![1.0, 3.0, -1.0, 1.0];
        assert_eq!(downmix_to_mono(&interleaved, 2), vec![2.0, 0.0]);
    }

    #[test]
    fn passthrough_resampler_copies_samples() -> Result<()> {
        let mut resampler = MonoResampler::new(TARGET_SAMPLE_RATE)?;
        let mut out = Vec::new();
        resampler.push(&[0.25; 100], &mut out)?;
        resampler.finish(&mut out)?;
        assert_eq!(out.len(), 100);
        Ok(())
    }

    #[test]
    fn resampler_halves_sample_count_from_32k() -> Result<()> {
        let mut resampler = MonoResampler::new(32_000)?;
        let mut out = Vec::new();

        // Two seconds of input at 32 kHz should land close to one second's
        // worth of output frames at 16 kHz (block padding adds a small tail).
        resampler.push(&vec![0.1; 64_000], &mut out)?;
        resampler.finish(&mut out)?;

        let expected = 32_000usize;
        let tolerance = 4_096;
        assert!(
            out.len().abs_diff(expected) < tolerance,
            "got {} samples, expected about {expected}",
            out.len()
        );
        Ok(())
    }

    #[test]
    fn ensure_normalized_reuses_existing_waveform() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let workdir = WorkDir::at(tmp.path().join("wd"))?;

        // Pre-seed the cache; the bogus input path must never be touched.
        crate::wav::write_waveform(&workdir.waveform_path(), &[0.0; 160], TARGET_SAMPLE_RATE)?;

        let out = ensure_normalized(Path::new("/nonexistent/input.mkv"), &workdir)?;
        assert_eq!(out, workdir.waveform_path());
        Ok(())
    }

    #[test]
    fn decode_media_fails_cleanly_on_missing_file() {
        let err = decode_media(Path::new("/nonexistent/input.mkv")).unwrap_err();
        assert!(matches!(err, Error::MediaRead(_)));
    }

    #[test]
    fn decode_media_reads_wav_input() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("input.wav");
        let samples: Vec<f32> = (0..8_000).map(|i| (i as f32 / 50.0).sin() * 0.4).collect();
        crate::wav::write_waveform(&path, &samples, TARGET_SAMPLE_RATE)?;

        let waveform = decode_media(&path)?;
        assert_eq!(waveform.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(waveform.samples.len(), samples.len());
        Ok(())
    }
}

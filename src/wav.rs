//! WAV reading and writing for the canonical waveform and slice artifacts.
//!
//! Everything downstream of the normalizer works on mono `f32` samples at
//! [`TARGET_SAMPLE_RATE`]; this module enforces that format at the read
//! boundary and produces it at the write boundary.

use std::io::{Read, Seek};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{Error, Result};

/// Cueline's canonical mono sample rate (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// A normalized, immutable waveform: mono samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Total duration in whole milliseconds (truncated).
    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as u64) * 1_000 / self.sample_rate as u64
    }

    /// Sample index for a timestamp, rounded down. Clamped to the buffer.
    pub fn sample_index_floor(&self, ms: u64) -> usize {
        let idx = (ms * self.sample_rate as u64 / 1_000) as usize;
        idx.min(self.samples.len())
    }

    /// Sample index for a timestamp, rounded up. Clamped to the buffer.
    pub fn sample_index_ceil(&self, ms: u64) -> usize {
        let idx = (ms * self.sample_rate as u64).div_ceil(1_000) as usize;
        idx.min(self.samples.len())
    }
}

/// Load a waveform from a WAV file, enforcing the canonical format.
///
/// Format requirements:
/// - Mono (1 channel)
/// - [`TARGET_SAMPLE_RATE`]
///
/// Why we enforce this:
/// - enforcing constraints here keeps downstream detection, slicing, and
///   transcription simple and predictable
pub fn read_waveform(path: &Path) -> Result<Waveform> {
    let file = std::fs::File::open(path)?;
    read_waveform_from(file)
}

/// Reader-based variant of [`read_waveform`] so tests can use in-memory buffers.
pub fn read_waveform_from<R>(reader: R) -> Result<Waveform>
where
    R: Read + Seek,
{
    let mut reader = WavReader::new(reader)?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(Error::msg(format!(
            "expected mono WAV (1 channel), got {} channels",
            spec.channels
        )));
    }

    if spec.sample_rate != TARGET_SAMPLE_RATE {
        return Err(Error::msg(format!(
            "expected {TARGET_SAMPLE_RATE} Hz sample rate, got {} Hz",
            spec.sample_rate
        )));
    }

    // Read samples and normalize from i16 PCM to f32 in [-1.0, 1.0].
    let mut samples = Vec::with_capacity(reader.len() as usize);
    for sample in reader.samples::<i16>() {
        let pcm = sample?;
        samples.push(pcm as f32 / i16::MAX as f32);
    }

    Ok(Waveform::new(samples, spec.sample_rate))
}

/// Write mono `f32` samples as 16-bit PCM WAV.
///
/// Samples are clamped to `[-1.0, 1.0]` before conversion so out-of-range
/// values from upstream processing never wrap.
pub fn write_waveform(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(pcm)?;
    }
    writer.finalize()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_round_trips_within_quantization() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("tone.wav");

        let samples: Vec<f32> = (0..1_600)
            .map(|i| (i as f32 / 100.0).sin() * 0.5)
            .collect();
        write_waveform(&path, &samples, TARGET_SAMPLE_RATE)?;

        let waveform = read_waveform(&path)?;
        assert_eq!(waveform.samples.len(), samples.len());
        assert_eq!(waveform.duration_ms(), 100);
        for (got, want) in waveform.samples.iter().zip(&samples) {
            assert!((got - want).abs() < 1.0 / i16::MAX as f32 * 2.0);
        }
        Ok(())
    }

    #[test]
    fn rejects_wrong_sample_rate() -> Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut buf = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut buf, spec)?;
        writer.write_sample(0i16)?;
        writer.finalize()?;
        buf.set_position(0);

        let err = read_waveform_from(buf).unwrap_err();
        assert!(err.to_string().contains("sample rate"));
        Ok(())
    }

    #[test]
    fn sample_index_conversions_clamp_to_buffer() {
        let waveform = Waveform::new(vec![0.0; 16_000], TARGET_SAMPLE_RATE);
        assert_eq!(waveform.sample_index_floor(0), 0);
        assert_eq!(waveform.sample_index_floor(500), 8_000);
        assert_eq!(waveform.sample_index_ceil(500), 8_000);
        assert_eq!(waveform.sample_index_ceil(1), 16);
        assert_eq!(waveform.sample_index_floor(10_000), 16_000);
        assert_eq!(waveform.sample_index_ceil(10_000), 16_000);
    }
}

use std::path::Path;

use tracing::debug;
use whisper_rs::{WhisperVadContext, WhisperVadContextParams, WhisperVadParams};

use super::init_whisper_logging;
use crate::detector::{RawSpeechSpan, SpeechDetector};
use crate::error::{Error, Result};
use crate::wav::Waveform;

/// Speech detector backed by whisper.cpp's VAD models (e.g. Silero).
///
/// The model is loaded once at construction; a load failure is fatal to the
/// run ([`Error::ModelUnavailable`]), typically a missing or unauthorized
/// model file. Detection itself runs a single pass over the full waveform;
/// whisper.cpp handles long-form input internally, so no pre-chunking happens
/// here.
pub struct WhisperVadDetector {
    ctx: WhisperVadContext,
}

impl WhisperVadDetector {
    pub fn new(model_path: &str) -> Result<Self> {
        init_whisper_logging();

        if model_path.trim().is_empty() {
            return Err(Error::ModelUnavailable(
                "VAD model path must be provided".into(),
            ));
        }

        let path = Path::new(model_path);
        if !path.is_file() {
            return Err(Error::ModelUnavailable(format!(
                "VAD model not found at '{model_path}'"
            )));
        }

        let params = WhisperVadContextParams::default();
        let ctx = WhisperVadContext::new(model_path, params).map_err(|err| {
            Error::ModelUnavailable(format!("failed to load VAD model from '{model_path}': {err}"))
        })?;

        Ok(Self { ctx })
    }
}

impl SpeechDetector for WhisperVadDetector {
    fn detect(&mut self, waveform: &Waveform) -> Result<Vec<RawSpeechSpan>> {
        if waveform.samples.is_empty() {
            return Ok(Vec::new());
        }

        let params = WhisperVadParams::default();
        let segments = self
            .ctx
            .segments_from_samples(params, &waveform.samples)
            .map_err(|err| Error::msg(format!("VAD inference failed: {err}")))?;

        let count = segments.num_segments();
        let mut spans = Vec::with_capacity(count.max(0) as usize);

        for i in 0..count {
            let start_cs = segments
                .get_segment_start_timestamp(i)
                .ok_or_else(|| Error::msg(format!("missing start timestamp for VAD segment {i}")))?;
            let end_cs = segments
                .get_segment_end_timestamp(i)
                .ok_or_else(|| Error::msg(format!("missing end timestamp for VAD segment {i}")))?;

            // whisper.cpp VAD timestamps are centiseconds (10ms units).
            let start_ms = centiseconds_to_ms(start_cs);
            let end_ms = centiseconds_to_ms(end_cs);
            spans.push(RawSpeechSpan::new(start_ms, end_ms));
        }

        debug!(spans = spans.len(), "VAD pass complete");
        Ok(spans)
    }
}

fn centiseconds_to_ms(cs: f32) -> u64 {
    let ms = (cs as f64) * 10.0;
    if ms <= 0.0 { 0 } else { ms.round() as u64 }
}

use std::path::Path;

use tracing::debug;
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use super::init_whisper_logging;
use crate::engine::{TranscriptSpan, TranscriptionEngine};
use crate::error::{Error, Result};

/// Transcription engine backed by whisper.cpp.
///
/// One engine wraps one loaded model. Whisper state is created per call, so a
/// single engine can transcribe many slices; it is **not** safe to share one
/// engine across threads; bounded-parallel dispatch builds one engine per
/// worker instead.
pub struct WhisperEngine {
    ctx: WhisperContext,
}

impl WhisperEngine {
    /// Load a whisper.cpp model from disk.
    pub fn new(model_path: &str) -> Result<Self> {
        init_whisper_logging();

        if model_path.trim().is_empty() {
            return Err(Error::ModelUnavailable(
                "model path must be provided".into(),
            ));
        }
        if !Path::new(model_path).is_file() {
            return Err(Error::ModelUnavailable(format!(
                "model not found at '{model_path}'"
            )));
        }

        let ctx_params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(model_path, ctx_params).map_err(|err| {
            Error::ModelUnavailable(format!("failed to load model from '{model_path}': {err}"))
        })?;

        Ok(Self { ctx })
    }

    /// Access the underlying Whisper context.
    ///
    /// This is primarily intended for advanced or experimental use-cases.
    pub fn context(&self) -> &WhisperContext {
        &self.ctx
    }

    fn run_full(&self, samples: &[f32], language: Option<&str>) -> Result<WhisperState> {
        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: 5,
            patience: 1.0,
        });

        params.set_n_threads(num_cpus::get() as i32);
        params.set_translate(false);
        params.set_language(language);
        params.set_no_context(true);
        params.set_single_segment(false);

        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|err| Error::msg(format!("failed to create whisper state: {err}")))?;

        state
            .full(params, samples)
            .map_err(|err| Error::msg(format!("whisper full() failed: {err}")))?;

        Ok(state)
    }
}

impl TranscriptionEngine for WhisperEngine {
    fn transcribe(
        &mut self,
        samples: &[f32],
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSpan>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.run_full(samples, language)?;

        let mut spans = Vec::new();
        for segment in state.as_iter() {
            let text = segment
                .to_str()
                .map_err(|err| Error::msg(format!("failed to get segment text: {err}")))?
                .trim()
                .to_owned();

            // Whisper timestamps are centiseconds (1/100s), local to the slice.
            let start_ms = centiseconds_to_ms(segment.start_timestamp());
            let end_ms = centiseconds_to_ms(segment.end_timestamp());
            spans.push(TranscriptSpan::new(text, start_ms, end_ms));
        }

        debug!(spans = spans.len(), "whisper pass complete");
        Ok(spans)
    }
}

fn centiseconds_to_ms(cs: i64) -> u64 {
    if cs <= 0 { 0 } else { (cs as u64) * 10 }
}

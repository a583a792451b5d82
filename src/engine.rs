//! Transcription collaborator interface.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One timestamped text span returned by a transcription engine.
///
/// Timestamps are **local to the transcribed slice**; the merger re-projects
/// them onto the global timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSpan {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl TranscriptSpan {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
        }
    }
}

/// Speech-to-text collaborator.
///
/// Implementations load their model once at construction (failing with
/// [`crate::Error::ModelUnavailable`]). `transcribe` receives one slice's
/// mono samples at the canonical sample rate plus an optional language hint,
/// and returns spans ordered by start time.
///
/// Errors from `transcribe` are local to the slice being processed; the
/// dispatcher records them and moves on.
pub trait TranscriptionEngine {
    fn transcribe(
        &mut self,
        samples: &[f32],
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSpan>>;
}

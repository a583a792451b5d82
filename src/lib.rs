//! `cueline` — resumable subtitle generation from spoken audio/video.
//!
//! This crate provides:
//! - Media normalization to a canonical mono 16 kHz waveform
//! - VAD-driven speech segmentation with padding and merge policies
//! - A content-addressed, crash-safe job store so interrupted runs resume
//!   without re-doing completed work
//! - Slice-wise Whisper transcription with partial-failure tolerance
//! - Timeline merging into a single ordered cue track
//! - Pluggable subtitle encoders (SRT, VTT)
//!
//! The library is designed to be used by both CLI tools and batch jobs, with
//! an emphasis on determinism, resumability, and minimal surprises.

// High-level API (most consumers should start here).
pub mod opts;
pub mod pipeline;

// Crate-wide error taxonomy.
pub mod error;

// Per-input persistent state layout.
pub mod workdir;

// Audio normalization and WAV IO.
pub mod normalize;
pub mod wav;

// Speech detection, slicing, and transcription collaborators.
pub mod backends;
pub mod detector;
pub mod engine;
pub mod slice;

// Resumable per-slice state.
pub mod store;

// Dispatch and timeline merging.
pub mod dispatch;
pub mod merge;

// Output selection and encoder interfaces.
pub mod cue_encoder;
pub mod output_type;

// Output encoders that serialize cues into subtitle formats.
pub mod srt_encoder;
pub mod vtt_encoder;

// Logging configuration and control.
pub mod logging;

pub use error::{Error, Result};

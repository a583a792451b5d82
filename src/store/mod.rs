//! Resumable job store.
//!
//! One [`JobRecord`] per slice tracks how far that slice has progressed:
//!
//! ```text
//! pending -> extracted -> transcribed
//!                     \-> failed        (eligible for retry on the next run)
//! ```
//!
//! The store is the single shared mutable resource in the pipeline, and its
//! contract is the entirety of the concurrency discipline the dispatcher
//! needs: every transition is atomic per slice and durable before the call
//! returns, so a crash between slices loses at most the in-flight slice. The
//! abstraction is storage-independent (the filesystem implementation backs
//! real runs, the in-memory one backs tests), which keeps the crash-recovery
//! invariant separate from any particular persistence choice.

mod fs;
mod memory;

pub use fs::FsJobStore;
pub use memory::MemoryJobStore;

use serde::{Deserialize, Serialize};

use crate::engine::TranscriptSpan;
use crate::error::Result;

/// Processing state of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No work recorded yet.
    Pending,
    /// The slice's audio artifact has been written.
    Extracted,
    /// The engine returned a payload; terminal for this run and reusable by
    /// later runs.
    Transcribed,
    /// The engine failed; a later run will retry from extraction.
    Failed,
}

/// The raw result of transcribing one slice: ordered spans with timestamps
/// local to the slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptPayload {
    pub spans: Vec<TranscriptSpan>,
}

/// Persisted per-slice processing state enabling resumable runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub slice_index: usize,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TranscriptPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    /// A fresh record for a slice with no recorded work.
    pub fn pending(slice_index: usize) -> Self {
        Self {
            slice_index,
            status: JobStatus::Pending,
            payload: None,
            error: None,
        }
    }

    /// Structural consistency check used when reading persisted records.
    pub(crate) fn is_consistent(&self) -> bool {
        match self.status {
            // A transcribed record must carry its payload.
            JobStatus::Transcribed => self.payload.is_some(),
            _ => self.payload.is_none(),
        }
    }
}

/// Per-slice state store with atomic, durable transitions.
///
/// Methods take `&self` so bounded-parallel dispatch can share one store
/// across workers; implementations guarantee per-slice atomicity (no torn
/// reads of a record), not cross-slice transactions, which is all the
/// dispatcher relies on.
pub trait JobStore: Send + Sync {
    /// Return the record for a slice, or a fresh `Pending` record if unseen.
    fn lookup(&self, slice_index: usize) -> Result<JobRecord>;

    /// Record that the slice's audio artifact is on disk.
    fn mark_extracted(&self, slice_index: usize) -> Result<()>;

    /// Record the engine's payload for a slice.
    fn mark_transcribed(&self, slice_index: usize, payload: TranscriptPayload) -> Result<()>;

    /// Record an engine failure for a slice.
    fn mark_failed(&self, slice_index: usize, error: &str) -> Result<()>;

    /// All records seen so far, ordered by slice index.
    fn all_records(&self) -> Result<Vec<JobRecord>>;
}

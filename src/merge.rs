//! Timeline merging: per-slice transcripts → one global cue track.
//!
//! The merge is purely a function of the persisted job records and the slice
//! plan. It never touches the engine, so "finalize output" re-runs are cheap:
//! patch up failed slices in a later pass, then merge again.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::slice::Slice;
use crate::store::{JobRecord, JobStatus};

/// A final timestamped subtitle line on the global timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Merge transcribed records into a globally ordered cue sequence.
///
/// For each transcribed slice, in index order:
/// - re-project every local span by adding the slice's global start
/// - clip span ends to the slice's global end (engines occasionally
///   hallucinate timestamps past the audio they were given)
/// - drop empty-text and zero-duration spans
///
/// The result is stable-sorted by global start time, so spans that share a
/// start keep slice-index order: cues from slice 2 never precede cues from
/// slice 1 at the same timestamp, regardless of transcription completion
/// order.
pub fn merge_cues(slices: &[Slice], records: &[JobRecord]) -> Vec<Cue> {
    let by_index: HashMap<usize, &JobRecord> = records
        .iter()
        .map(|record| (record.slice_index, record))
        .collect();

    let mut cues = Vec::new();
    let mut dropped = 0usize;

    for slice in slices {
        let Some(record) = by_index.get(&slice.index) else {
            continue;
        };
        if record.status != JobStatus::Transcribed {
            continue;
        }
        let Some(payload) = record.payload.as_ref() else {
            continue;
        };

        for span in &payload.spans {
            let text = span.text.trim();
            if text.is_empty() {
                dropped += 1;
                continue;
            }

            let start_ms = slice.start_ms + span.start_ms;
            let end_ms = (slice.start_ms + span.end_ms).min(slice.end_ms);
            if end_ms <= start_ms {
                dropped += 1;
                continue;
            }

            cues.push(Cue {
                start_ms,
                end_ms,
                text: text.to_owned(),
            });
        }
    }

    cues.sort_by_key(|cue| cue.start_ms);

    if dropped > 0 {
        debug!(dropped, "dropped empty or zero-duration spans during merge");
    }
    cues
}

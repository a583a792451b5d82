//! Speech segment detection.
//!
//! A [`SpeechDetector`] runs a VAD model once over the whole normalized
//! waveform and reports raw speech spans, which may overlap and may carry
//! speaker labels. [`flatten_spans`] post-processes them into the flattened,
//! non-overlapping [`SpeechInterval`] list the slicer consumes: a union of all
//! speech regardless of speaker, with short silences merged away so sparse
//! dialogue does not explode into tiny slices.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::wav::Waveform;

/// One raw span reported by a VAD model.
///
/// Spans may overlap (continuous speaker turns often do) and carry an optional
/// speaker label that this pipeline deliberately ignores: diarization is a
/// non-goal; we only care whether *anyone* is speaking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpeechSpan {
    pub start_ms: u64,
    pub end_ms: u64,
    pub speaker: Option<String>,
}

impl RawSpeechSpan {
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self {
            start_ms,
            end_ms,
            speaker: None,
        }
    }
}

/// A flattened speech interval on the global timeline.
///
/// Invariants (maintained by [`flatten_spans`]):
/// - `start_ms < end_ms`
/// - intervals are pairwise non-overlapping and sorted ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechInterval {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl SpeechInterval {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Voice-activity-detection collaborator.
///
/// Implementations load their model once at construction (failing with
/// [`crate::Error::ModelUnavailable`]) and run a single pass over the full
/// waveform; long-form handling is the model's job, not the caller's.
pub trait SpeechDetector {
    fn detect(&mut self, waveform: &Waveform) -> Result<Vec<RawSpeechSpan>>;
}

/// Flatten raw VAD spans into sorted, non-overlapping intervals.
///
/// Steps:
/// 1. Drop degenerate spans (`end <= start`).
/// 2. Sort by start time.
/// 3. Union overlapping spans and merge adjacent ones separated by a gap
///    shorter than `silence_merge_ms`.
pub fn flatten_spans(mut spans: Vec<RawSpeechSpan>, silence_merge_ms: u64) -> Vec<SpeechInterval> {
    spans.retain(|span| span.end_ms > span.start_ms);
    if spans.is_empty() {
        return Vec::new();
    }

    spans.sort_by_key(|span| (span.start_ms, span.end_ms));

    let mut intervals: Vec<SpeechInterval> = Vec::new();
    for span in spans {
        if let Some(last) = intervals.last_mut() {
            let gap = span.start_ms.saturating_sub(last.end_ms);
            if span.start_ms <= last.end_ms || gap < silence_merge_ms {
                last.end_ms = last.end_ms.max(span.end_ms);
                continue;
            }
        }

        intervals.push(SpeechInterval {
            start_ms: span.start_ms,
            end_ms: span.end_ms,
        });
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start_ms: u64, end_ms: u64) -> RawSpeechSpan {
        RawSpeechSpan::new(start_ms, end_ms)
    }

    #[test]
    fn empty_input_yields_no_intervals() {
        assert!(flatten_spans(Vec::new(), 2_000).is_empty());
    }

    #[test]
    fn degenerate_spans_are_dropped() {
        let intervals = flatten_spans(vec![span(500, 500), span(800, 700)], 0);
        assert!(intervals.is_empty());
    }

    #[test]
    fn overlapping_speaker_turns_are_unioned() {
        let mut a = span(0, 1_000);
        a.speaker = Some("SPEAKER_00".into());
        let mut b = span(600, 1_500);
        b.speaker = Some("SPEAKER_01".into());

        let intervals = flatten_spans(vec![a, b], 0);
        assert_eq!(
            intervals,
            vec![SpeechInterval {
                start_ms: 0,
                end_ms: 1_500,
            }]
        );
    }

    #[test]
    fn short_silences_are_merged_long_ones_split() {
        let intervals = flatten_spans(
            vec![span(0, 1_000), span(2_500, 3_000), span(6_000, 7_000)],
            2_000,
        );
        // 1.5s gap merges (below threshold); 3s gap splits.
        assert_eq!(
            intervals,
            vec![
                SpeechInterval {
                    start_ms: 0,
                    end_ms: 3_000,
                },
                SpeechInterval {
                    start_ms: 6_000,
                    end_ms: 7_000,
                },
            ]
        );
    }

    #[test]
    fn gap_equal_to_threshold_is_not_merged() {
        let intervals = flatten_spans(vec![span(0, 1_000), span(3_000, 4_000)], 2_000);
        assert_eq!(intervals.len(), 2);
    }

    #[test]
    fn unsorted_input_is_handled() {
        let intervals = flatten_spans(vec![span(5_000, 6_000), span(0, 1_000)], 1_000);
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].start_ms, 0);
        assert_eq!(intervals[1].start_ms, 5_000);
    }

    #[test]
    fn result_is_nonoverlapping_and_sorted() {
        let spans = vec![
            span(100, 900),
            span(0, 400),
            span(850, 2_000),
            span(5_000, 5_100),
        ];
        let intervals = flatten_spans(spans, 500);
        for pair in intervals.windows(2) {
            assert!(pair[0].end_ms < pair[1].start_ms);
        }
    }
}

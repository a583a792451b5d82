//! Slice planning and extraction.
//!
//! A slice is the unit of transcription and of resumability: a padded, merged
//! span of the global timeline with a stable 0-based index and its own audio
//! artifact on disk. Planning is pure and deterministic: identical
//! (duration, intervals, padding) always yields identical slices, which is
//! what lets a re-run trust indices recorded by a previous one. To protect
//! that property across runs even if detection is nondeterministic, the plan
//! itself is persisted to `slices.json` and reloaded in preference to
//! re-detecting.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detector::SpeechInterval;
use crate::error::Result;
use crate::wav::{self, Waveform};
use crate::workdir::write_json_atomic;

/// A padded, merged unit of audio extracted for independent transcription.
///
/// `start_ms..end_ms` is on the global timeline and includes padding. No two
/// slices in a plan overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Slice {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Plan slices from speech intervals.
///
/// Algorithm: expand each interval by `pad_ms` on both sides, clamp to
/// `[0, duration_ms]`, sort by start, then sweep left-to-right merging any two
/// candidates whose padded spans overlap or touch. Indices are assigned after
/// merging, so they are contiguous from 0.
pub fn plan_slices(duration_ms: u64, intervals: &[SpeechInterval], pad_ms: u64) -> Vec<Slice> {
    let mut padded: Vec<(u64, u64)> = intervals
        .iter()
        .filter(|interval| interval.start_ms < duration_ms)
        .map(|interval| {
            let start = interval.start_ms.saturating_sub(pad_ms);
            let end = (interval.end_ms + pad_ms).min(duration_ms);
            (start, end)
        })
        .filter(|(start, end)| end > start)
        .collect();

    padded.sort_unstable();

    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(padded.len());
    for (start, end) in padded {
        if let Some((_, prev_end)) = merged.last_mut() {
            // Touching ranges count as overlapping: one slice, one engine call.
            if start <= *prev_end {
                *prev_end = (*prev_end).max(end);
                continue;
            }
        }
        merged.push((start, end));
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(index, (start_ms, end_ms))| Slice {
            index,
            start_ms,
            end_ms,
        })
        .collect()
}

/// Extract one slice's samples from the waveform and persist them as a WAV
/// artifact at `path`.
pub fn extract_slice(waveform: &Waveform, slice: &Slice, path: &Path) -> Result<()> {
    let start = waveform.sample_index_floor(slice.start_ms);
    let end = waveform.sample_index_ceil(slice.end_ms).max(start);

    wav::write_waveform(path, &waveform.samples[start..end], waveform.sample_rate)?;
    debug!(
        index = slice.index,
        start_ms = slice.start_ms,
        end_ms = slice.end_ms,
        "extracted slice audio"
    );
    Ok(())
}

/// Persist a slice plan for reuse by later runs.
pub fn save_plan(path: &Path, slices: &[Slice]) -> Result<()> {
    write_json_atomic(path, &slices)
}

/// Load a previously persisted slice plan.
///
/// Returns `Ok(None)` when no plan exists yet or the file is unreadable; a
/// corrupt plan is logged and discarded so the run falls back to re-detection.
pub fn load_plan(path: &Path) -> Result<Option<Vec<Slice>>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    match serde_json::from_slice::<Vec<Slice>>(&bytes) {
        Ok(slices) if plan_is_consistent(&slices) => Ok(Some(slices)),
        Ok(_) => {
            warn!(path = %path.display(), "slice plan is inconsistent; re-detecting");
            Ok(None)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "slice plan is corrupt; re-detecting");
            Ok(None)
        }
    }
}

/// Check plan invariants: contiguous indices, positive durations, no overlap.
fn plan_is_consistent(slices: &[Slice]) -> bool {
    slices.iter().enumerate().all(|(i, slice)| {
        slice.index == i
            && slice.start_ms < slice.end_ms
            && (i == 0 || slices[i - 1].end_ms <= slice.start_ms)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::TARGET_SAMPLE_RATE;

    fn interval(start_ms: u64, end_ms: u64) -> SpeechInterval {
        SpeechInterval { start_ms, end_ms }
    }

    #[test]
    fn empty_intervals_yield_empty_plan() {
        assert!(plan_slices(60_000, &[], 300).is_empty());
    }

    #[test]
    fn padding_is_applied_and_clamped() {
        let slices = plan_slices(10_000, &[interval(100, 9_900)], 300);
        assert_eq!(
            slices,
            vec![Slice {
                index: 0,
                start_ms: 0,
                end_ms: 10_000,
            }]
        );
    }

    #[test]
    fn padded_overlaps_are_merged() {
        // 400ms gap, 300ms padding on both sides -> padded spans overlap.
        let slices = plan_slices(60_000, &[interval(1_000, 2_000), interval(2_400, 3_000)], 300);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].start_ms, 700);
        assert_eq!(slices[0].end_ms, 3_300);
    }

    #[test]
    fn touching_padded_spans_are_merged() {
        // Exactly touching after padding (2_300 == 2_300).
        let slices = plan_slices(60_000, &[interval(1_000, 2_000), interval(2_600, 3_000)], 300);
        assert_eq!(slices.len(), 1);
    }

    #[test]
    fn distant_intervals_stay_separate_with_contiguous_indices() {
        let slices = plan_slices(
            60_000,
            &[interval(0, 1_000), interval(10_000, 11_000), interval(30_000, 31_000)],
            300,
        );
        assert_eq!(slices.len(), 3);
        for (i, slice) in slices.iter().enumerate() {
            assert_eq!(slice.index, i);
        }
    }

    #[test]
    fn slices_never_overlap_and_cover_padded_intervals() {
        let intervals = [
            interval(0, 500),
            interval(700, 1_200),
            interval(5_000, 9_000),
            interval(9_100, 9_500),
            interval(20_000, 21_000),
        ];
        let pad_ms = 250;
        let duration_ms = 30_000;
        let slices = plan_slices(duration_ms, &intervals, pad_ms);

        for pair in slices.windows(2) {
            assert!(pair[0].end_ms < pair[1].start_ms);
        }

        // Coverage: every padded interval sits inside some slice.
        for iv in &intervals {
            let lo = iv.start_ms.saturating_sub(pad_ms);
            let hi = (iv.end_ms + pad_ms).min(duration_ms);
            assert!(
                slices.iter().any(|s| s.start_ms <= lo && hi <= s.end_ms),
                "padded interval {lo}..{hi} not covered"
            );
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let intervals = [interval(100, 900), interval(1_500, 3_200), interval(9_000, 9_800)];
        let a = plan_slices(20_000, &intervals, 300);
        let b = plan_slices(20_000, &intervals, 300);
        assert_eq!(a, b);
    }

    #[test]
    fn interval_past_end_of_audio_is_dropped() {
        let slices = plan_slices(5_000, &[interval(6_000, 7_000)], 300);
        assert!(slices.is_empty());
    }

    #[test]
    fn extract_writes_expected_sample_count() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("slice.wav");

        let waveform = Waveform::new(vec![0.1; 32_000], TARGET_SAMPLE_RATE);
        let slice = Slice {
            index: 0,
            start_ms: 500,
            end_ms: 1_500,
        };
        extract_slice(&waveform, &slice, &path)?;

        let extracted = wav::read_waveform(&path)?;
        assert_eq!(extracted.samples.len(), 16_000);
        Ok(())
    }

    #[test]
    fn plan_round_trips_through_disk() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("slices.json");

        let slices = plan_slices(20_000, &[interval(100, 900), interval(5_000, 6_000)], 300);
        save_plan(&path, &slices)?;

        let loaded = load_plan(&path)?.expect("plan should load");
        assert_eq!(loaded, slices);
        Ok(())
    }

    #[test]
    fn corrupt_plan_loads_as_none() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("slices.json");
        std::fs::write(&path, b"{ not json")?;
        assert!(load_plan(&path)?.is_none());
        Ok(())
    }

    #[test]
    fn inconsistent_plan_loads_as_none() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("slices.json");

        // Overlapping slices violate the plan invariant.
        let bad = vec![
            Slice {
                index: 0,
                start_ms: 0,
                end_ms: 2_000,
            },
            Slice {
                index: 1,
                start_ms: 1_000,
                end_ms: 3_000,
            },
        ];
        std::fs::write(&path, serde_json::to_vec(&bad)?)?;
        assert!(load_plan(&path)?.is_none());
        Ok(())
    }

    #[test]
    fn missing_plan_loads_as_none() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        assert!(load_plan(&tmp.path().join("slices.json"))?.is_none());
        Ok(())
    }
}

//! End-to-end pipeline tests with scripted detector/engine collaborators.
//!
//! These exercise the full flow over a real working directory: normalization
//! caching, slice planning and reuse, resumable dispatch, merging, and
//! subtitle encoding. Model backends are replaced by deterministic mocks so
//! the tests need no model files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cueline::detector::{RawSpeechSpan, SpeechDetector};
use cueline::engine::{TranscriptSpan, TranscriptionEngine};
use cueline::error::Error;
use cueline::opts::Opts;
use cueline::output_type::OutputType;
use cueline::pipeline::{Pipeline, RunStatus, encode_cues};
use cueline::wav::{self, TARGET_SAMPLE_RATE};

/// Detector that reports three well-separated speech spans and counts calls
/// through a shared counter (the detector itself is moved into the pipeline).
struct ScriptedDetector {
    calls: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl SpeechDetector for ScriptedDetector {
    fn detect(&mut self, _waveform: &cueline::wav::Waveform) -> cueline::Result<Vec<RawSpeechSpan>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(vec![
            RawSpeechSpan::new(1_000, 2_000),
            RawSpeechSpan::new(5_000, 6_500),
            RawSpeechSpan::new(10_000, 11_000),
        ])
    }
}

/// Engine that emits one span per slice and can fail on a chosen call.
struct ScriptedEngine {
    calls: usize,
    fail_on_call: Option<usize>,
}

impl ScriptedEngine {
    fn new() -> Self {
        Self {
            calls: 0,
            fail_on_call: None,
        }
    }

    fn failing_on(call: usize) -> Self {
        Self {
            calls: 0,
            fail_on_call: Some(call),
        }
    }
}

impl TranscriptionEngine for ScriptedEngine {
    fn transcribe(
        &mut self,
        samples: &[f32],
        _language: Option<&str>,
    ) -> cueline::Result<Vec<TranscriptSpan>> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on_call == Some(call) {
            return Err(Error::Message("scripted engine failure".into()));
        }

        // One span covering most of the slice, so timing scales with input.
        let slice_ms = (samples.len() as u64) * 1_000 / TARGET_SAMPLE_RATE as u64;
        Ok(vec![TranscriptSpan::new(
            format!("utterance {call}"),
            100,
            slice_ms.saturating_sub(100).max(200),
        )])
    }
}

/// Write a 13-second silent-ish WAV input and return its path.
fn write_input(dir: &Path) -> PathBuf {
    let path = dir.join("input.wav");
    let samples = vec![0.05f32; TARGET_SAMPLE_RATE as usize * 13];
    wav::write_waveform(&path, &samples, TARGET_SAMPLE_RATE).expect("write input wav");
    path
}

fn default_opts() -> Opts {
    Opts {
        pad_ms: 300,
        silence_merge_ms: 2_000,
        ..Opts::default()
    }
}

#[test]
fn full_run_produces_ordered_srt() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = write_input(tmp.path());
    let work_root = tmp.path().join("work");
    let opts = default_opts();

    let mut pipeline = Pipeline::new(ScriptedDetector::new());
    let mut engine = ScriptedEngine::new();
    let mut out = Vec::new();
    let summary = pipeline.run(&input, &work_root, &opts, &mut engine, &mut out)?;

    assert_eq!(summary.status(), RunStatus::Success);
    assert_eq!(summary.total_slices, 3);
    assert_eq!(summary.transcribed, 3);
    assert_eq!(summary.cues, 3);

    let srt = String::from_utf8(out)?;
    // First slice starts at 1000ms minus 300ms padding; its span starts 100ms in.
    assert!(srt.starts_with("1\n00:00:00,800 --> "));
    let cues = parse_srt(&srt);
    assert_eq!(cues.len(), 3);
    assert!(cues.windows(2).all(|p| p[0].0 <= p[1].0), "cues out of order");
    Ok(())
}

#[test]
fn second_run_reuses_all_work() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = write_input(tmp.path());
    let work_root = tmp.path().join("work");
    let opts = default_opts();

    let mut pipeline = Pipeline::new(ScriptedDetector::new());
    let mut engine = ScriptedEngine::new();
    pipeline.run(&input, &work_root, &opts, &mut engine, &mut Vec::new())?;
    assert_eq!(engine.calls, 3);

    // Fresh pipeline + engine over the same working directory: detection and
    // transcription are both skipped.
    let detector = ScriptedDetector::new();
    let detections = detector.counter();
    let mut pipeline = Pipeline::new(detector);
    let mut engine = ScriptedEngine::new();
    let mut out = Vec::new();
    let summary = pipeline.run(&input, &work_root, &opts, &mut engine, &mut out)?;

    assert_eq!(detections.load(Ordering::Relaxed), 0);
    assert_eq!(engine.calls, 0);
    assert_eq!(summary.reused, 3);
    assert_eq!(summary.transcribed, 0);
    assert_eq!(summary.cues, 3);
    Ok(())
}

#[test]
fn partial_failure_still_emits_other_cues_and_recovers_on_rerun() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = write_input(tmp.path());
    let work_root = tmp.path().join("work");
    let opts = default_opts();

    let mut pipeline = Pipeline::new(ScriptedDetector::new());
    let mut engine = ScriptedEngine::failing_on(1);
    let mut out = Vec::new();
    let summary = pipeline.run(&input, &work_root, &opts, &mut engine, &mut out)?;

    assert_eq!(summary.status(), RunStatus::PartialFailure);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cues, 2);
    let srt = String::from_utf8(out)?;
    assert!(srt.contains("utterance 0"));
    assert!(srt.contains("utterance 2"));

    // Re-run with a healthy engine: only the failed slice is retried.
    let mut engine = ScriptedEngine::new();
    let mut out = Vec::new();
    let summary = pipeline.run(&input, &work_root, &opts, &mut engine, &mut out)?;
    assert_eq!(engine.calls, 1);
    assert_eq!(summary.status(), RunStatus::Success);
    assert_eq!(summary.cues, 3);
    Ok(())
}

#[test]
fn force_redetect_runs_detection_again() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = write_input(tmp.path());
    let work_root = tmp.path().join("work");
    let opts = default_opts();

    let detector = ScriptedDetector::new();
    let calls = detector.counter();
    let mut pipeline = Pipeline::new(detector);

    pipeline.prepare(&input, &work_root, &opts)?;
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    // The second prepare reuses the cached plan.
    pipeline.prepare(&input, &work_root, &opts)?;
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    let forced = Opts {
        force_redetect: true,
        ..default_opts()
    };
    pipeline.prepare(&input, &work_root, &forced)?;
    assert_eq!(calls.load(Ordering::Relaxed), 2);
    Ok(())
}

#[test]
fn srt_round_trip_preserves_cue_triples() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = write_input(tmp.path());
    let work_root = tmp.path().join("work");
    let opts = default_opts();

    let mut pipeline = Pipeline::new(ScriptedDetector::new());
    let prepared = pipeline.prepare(&input, &work_root, &opts)?;
    prepared.transcribe(&mut ScriptedEngine::new(), &opts)?;
    let cues = prepared.merge()?;

    let mut out = Vec::new();
    encode_cues(&cues, OutputType::Srt, &mut out)?;
    let parsed = parse_srt(std::str::from_utf8(&out)?);

    let expected: Vec<(u64, u64, String)> = cues
        .iter()
        .map(|c| (c.start_ms, c.end_ms, c.text.clone()))
        .collect();
    assert_eq!(parsed, expected);
    Ok(())
}

#[test]
fn vtt_output_contains_header_and_cues() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = write_input(tmp.path());
    let work_root = tmp.path().join("work");
    let opts = Opts {
        output_type: OutputType::Vtt,
        ..default_opts()
    };

    let mut pipeline = Pipeline::new(ScriptedDetector::new());
    let mut out = Vec::new();
    pipeline.run(&input, &work_root, &opts, &mut ScriptedEngine::new(), &mut out)?;

    let vtt = String::from_utf8(out)?;
    assert!(vtt.starts_with("WEBVTT\n\n"));
    assert!(vtt.contains("utterance 0"));
    Ok(())
}

/// Minimal SRT parser for round-trip assertions.
fn parse_srt(input: &str) -> Vec<(u64, u64, String)> {
    let mut cues = Vec::new();
    for block in input.split("\n\n").filter(|b| !b.trim().is_empty()) {
        let mut lines = block.lines();
        let _number = lines.next().expect("cue number");
        let timing = lines.next().expect("timing line");
        let (start, end) = timing.split_once(" --> ").expect("arrow");
        let text = lines.collect::<Vec<_>>().join("\n");
        cues.push((parse_srt_timestamp(start), parse_srt_timestamp(end), text));
    }
    cues
}

fn parse_srt_timestamp(ts: &str) -> u64 {
    let (hms, ms) = ts.split_once(',').expect("comma");
    let parts: Vec<u64> = hms.split(':').map(|p| p.parse().unwrap()).collect();
    (parts[0] * 3_600 + parts[1] * 60 + parts[2]) * 1_000 + ms.parse::<u64>().unwrap()
}

//! High-level API for running subtitle generation with Cueline.
//!
//! We expose a single, ergonomic entry point (`Pipeline`) that wires up
//! normalization → detection → slicing → dispatch → merge → encoding, while
//! keeping the lower-level pieces testable in their own modules.
//!
//! The intent is:
//! - We load the VAD model once (expensive) via the detector.
//! - Preparation (normalize/detect/slice) runs once and is cached on disk.
//! - Transcription resumes from whatever a previous run persisted.
//! - Merging is re-runnable without the engine, so "finalize output" after a
//!   patched-up partial run is cheap.
//!
//! Phases are exposed separately ([`Pipeline::prepare`] → [`PreparedRun`]) so
//! callers can choose sequential or pooled transcription, or skip straight to
//! merging.

use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::cue_encoder::CueEncoder;
use crate::detector::{SpeechDetector, flatten_spans};
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::engine::TranscriptionEngine;
use crate::error::Result;
use crate::merge::{Cue, merge_cues};
use crate::normalize;
use crate::opts::Opts;
use crate::output_type::OutputType;
use crate::slice::{self, Slice};
use crate::srt_encoder::SrtEncoder;
use crate::store::{FsJobStore, JobStore};
use crate::vtt_encoder::VttEncoder;
use crate::wav::{self, Waveform};
use crate::workdir::WorkDir;

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every slice is transcribed.
    Success,
    /// Some slices failed; the subtitle file covers the rest. Re-running will
    /// retry only the failed slices.
    PartialFailure,
}

/// Final accounting for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total_slices: usize,
    pub transcribed: usize,
    pub failed: usize,
    pub reused: usize,
    pub cues: usize,
}

impl RunSummary {
    pub fn status(&self) -> RunStatus {
        if self.failed > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        }
    }
}

/// The main high-level entry point.
///
/// `Pipeline` owns the speech detector (and with it the loaded VAD model).
/// Typical usage:
/// - Construct once.
/// - Call [`Pipeline::run`] for the whole flow, or [`Pipeline::prepare`] to
///   drive the phases individually.
pub struct Pipeline<D: SpeechDetector> {
    detector: D,
}

impl<D: SpeechDetector> Pipeline<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    /// Normalize the input, produce (or reload) the slice plan, and open the
    /// job store. No transcription happens here.
    ///
    /// `detect` runs only when there is no usable cached plan (or
    /// `opts.force_redetect` is set); a resumed run goes straight from the
    /// cached plan to dispatch, which is what keeps slice indices stable
    /// across runs.
    pub fn prepare(&mut self, input: &Path, work_root: &Path, opts: &Opts) -> Result<PreparedRun> {
        let workdir = WorkDir::for_input(work_root, input)?;
        let waveform_path = normalize::ensure_normalized(input, &workdir)?;
        let waveform = wav::read_waveform(&waveform_path)?;

        let plan_path = workdir.slice_plan_path();
        let cached = if opts.force_redetect {
            None
        } else {
            slice::load_plan(&plan_path)?
        };

        let slices = match cached {
            Some(slices) => {
                info!(slices = slices.len(), "reusing cached slice plan");
                slices
            }
            None => {
                let spans = self.detector.detect(&waveform)?;
                let intervals = flatten_spans(spans, opts.silence_merge_ms);
                let slices = slice::plan_slices(waveform.duration_ms(), &intervals, opts.pad_ms);
                slice::save_plan(&plan_path, &slices)?;
                info!(
                    intervals = intervals.len(),
                    slices = slices.len(),
                    "planned slices from speech detection"
                );
                slices
            }
        };

        let store = FsJobStore::open(workdir.records_dir())?;
        Ok(PreparedRun {
            workdir,
            waveform,
            slices,
            store,
        })
    }

    /// Run the whole flow with a single engine and write subtitles to `out`.
    pub fn run<E, W>(
        &mut self,
        input: &Path,
        work_root: &Path,
        opts: &Opts,
        engine: &mut E,
        out: W,
    ) -> Result<RunSummary>
    where
        E: TranscriptionEngine,
        W: Write,
    {
        let prepared = self.prepare(input, work_root, opts)?;
        let stats = prepared.transcribe(engine, opts)?;
        let cues = prepared.merge()?;
        encode_cues(&cues, opts.output_type, out)?;
        Ok(prepared.summarize(stats, cues.len()))
    }
}

/// A prepared run: normalized waveform, slice plan, and open job store.
pub struct PreparedRun {
    workdir: WorkDir,
    waveform: Waveform,
    slices: Vec<Slice>,
    store: FsJobStore,
}

impl PreparedRun {
    pub fn workdir(&self) -> &WorkDir {
        &self.workdir
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Transcribe pending slices sequentially.
    pub fn transcribe<E: TranscriptionEngine>(
        &self,
        engine: &mut E,
        opts: &Opts,
    ) -> Result<DispatchStats> {
        self.dispatcher(opts).run(engine)
    }

    /// Transcribe pending slices with a bounded worker pool, one engine per
    /// worker.
    pub fn transcribe_pool<E, F>(
        &self,
        factory: F,
        opts: &Opts,
    ) -> Result<DispatchStats>
    where
        E: TranscriptionEngine,
        F: Fn() -> Result<E> + Sync,
    {
        self.dispatcher(opts).run_pool(factory, opts.workers)
    }

    /// Merge persisted transcripts into the final cue sequence.
    ///
    /// Purely a function of the job store; never invokes the engine.
    pub fn merge(&self) -> Result<Vec<Cue>> {
        let records = self.store.all_records()?;
        Ok(merge_cues(&self.slices, &records))
    }

    /// Build the final summary from dispatch stats and the merged cue count.
    pub fn summarize(&self, stats: DispatchStats, cues: usize) -> RunSummary {
        RunSummary {
            total_slices: self.slices.len(),
            transcribed: stats.transcribed,
            failed: stats.failed,
            reused: stats.reused,
            cues,
        }
    }

    fn dispatcher<'a>(&'a self, opts: &Opts) -> Dispatcher<'a> {
        Dispatcher::new(
            &self.slices,
            &self.waveform,
            &self.workdir,
            &self.store as &dyn JobStore,
            opts.language.clone(),
        )
    }
}

/// Serialize cues to `out` in the requested format.
///
/// Output is buffered (especially important for stdout).
pub fn encode_cues<W: Write>(cues: &[Cue], output_type: OutputType, out: W) -> Result<()> {
    let writer = BufWriter::new(out);

    // Select an encoder based on the requested output type.
    // We keep this explicit (no trait objects) to avoid lifetime surprises.
    match output_type {
        OutputType::Srt => {
            let mut encoder = SrtEncoder::new(writer);
            write_all_then_close(cues, &mut encoder)
        }
        OutputType::Vtt => {
            let mut encoder = VttEncoder::new(writer);
            write_all_then_close(cues, &mut encoder)
        }
    }
}

fn write_all_then_close<E: CueEncoder>(cues: &[Cue], encoder: &mut E) -> Result<()> {
    let mut write_result = Ok(());
    for cue in cues {
        write_result = encoder.write_cue(cue);
        if write_result.is_err() {
            break;
        }
    }

    // Close regardless, but surface the first failure.
    let close_result = encoder.close();
    write_result.and(close_result)
}

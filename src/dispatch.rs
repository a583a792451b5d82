//! Transcription dispatch.
//!
//! The dispatcher walks slices in index order and drives each one to a
//! terminal state through the job store:
//! - already `transcribed` → skip (this is what makes re-runs cheap)
//! - otherwise → ensure the audio artifact exists, invoke the engine,
//!   record the payload or the failure
//!
//! Engine failures are local: the slice is marked `failed` and the run
//! continues, so one bad slice never aborts a long transcription pass. Store
//! and artifact IO failures are not local (they mean the working directory
//! itself is broken) and propagate.
//!
//! Dispatch is sequential by default to bound memory and model pressure. For
//! engines that tolerate concurrent invocation, [`Dispatcher::run_pool`]
//! distributes slices across a bounded worker pool, one engine per worker;
//! per-slice store atomicity is the only synchronization required.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, warn};

use crate::engine::TranscriptionEngine;
use crate::error::{Error, Result};
use crate::slice::{self, Slice};
use crate::store::{JobStatus, JobStore, TranscriptPayload};
use crate::wav::{self, Waveform};
use crate::workdir::WorkDir;

/// Outcome counts for one dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Slices transcribed by this pass.
    pub transcribed: usize,
    /// Slices that failed in this pass.
    pub failed: usize,
    /// Slices skipped because a prior run already transcribed them.
    pub reused: usize,
}

impl DispatchStats {
    fn absorb(&mut self, other: DispatchStats) {
        self.transcribed += other.transcribed;
        self.failed += other.failed;
        self.reused += other.reused;
    }
}

/// Drives pending slices through extraction and transcription.
pub struct Dispatcher<'a> {
    slices: &'a [Slice],
    waveform: &'a Waveform,
    workdir: &'a WorkDir,
    store: &'a dyn JobStore,
    language: Option<String>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        slices: &'a [Slice],
        waveform: &'a Waveform,
        workdir: &'a WorkDir,
        store: &'a dyn JobStore,
        language: Option<String>,
    ) -> Self {
        Self {
            slices,
            waveform,
            workdir,
            store,
            language,
        }
    }

    /// Process every slice sequentially with a single engine.
    pub fn run<E: TranscriptionEngine>(&self, engine: &mut E) -> Result<DispatchStats> {
        let mut stats = DispatchStats::default();
        for slice in self.slices {
            self.process_slice(slice, engine, &mut stats)?;
        }
        Ok(stats)
    }

    /// Process slices with a bounded worker pool.
    ///
    /// `factory` builds one engine per worker (model contexts are not shared
    /// across threads). Slices are claimed from a shared counter, so index
    /// order is the claim order even though completion order is unconstrained;
    /// the job store's per-slice atomic writes keep results consistent.
    pub fn run_pool<E, F>(&self, factory: F, workers: usize) -> Result<DispatchStats>
    where
        E: TranscriptionEngine,
        F: Fn() -> Result<E> + Sync,
    {
        let workers = workers.clamp(1, self.slices.len().max(1));
        if workers == 1 {
            let mut engine = factory()?;
            return self.run(&mut engine);
        }

        let next = AtomicUsize::new(0);
        let total = Mutex::new(DispatchStats::default());

        std::thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(scope.spawn(|| -> Result<DispatchStats> {
                    let mut engine = factory()?;
                    let mut stats = DispatchStats::default();
                    loop {
                        let claimed = next.fetch_add(1, Ordering::Relaxed);
                        let Some(slice) = self.slices.get(claimed) else {
                            break;
                        };
                        self.process_slice(slice, &mut engine, &mut stats)?;
                    }
                    Ok(stats)
                }));
            }

            for handle in handles {
                let stats = handle
                    .join()
                    .map_err(|_| Error::msg("dispatch worker panicked"))??;
                total
                    .lock()
                    .map_err(|_| Error::msg("dispatch stats mutex poisoned"))?
                    .absorb(stats);
            }
            Ok(())
        })?;

        let stats = total
            .into_inner()
            .map_err(|_| Error::msg("dispatch stats mutex poisoned"))?;
        Ok(stats)
    }

    fn process_slice<E: TranscriptionEngine>(
        &self,
        slice: &Slice,
        engine: &mut E,
        stats: &mut DispatchStats,
    ) -> Result<()> {
        let record = self.store.lookup(slice.index)?;
        if record.status == JobStatus::Transcribed {
            stats.reused += 1;
            return Ok(());
        }

        let audio_path = self.workdir.slice_audio_path(slice.index);

        // Extract unless a prior run already did and the artifact survived.
        // This is also the corrupt-record recovery path: a record downgraded
        // to pending lands here and re-derives everything.
        if record.status == JobStatus::Pending || !audio_path.exists() {
            slice::extract_slice(self.waveform, slice, &audio_path)?;
            self.store.mark_extracted(slice.index)?;
        }

        let slice_audio = wav::read_waveform(&audio_path)?;
        match engine.transcribe(&slice_audio.samples, self.language.as_deref()) {
            Ok(spans) => {
                self.store
                    .mark_transcribed(slice.index, TranscriptPayload { spans })?;
                stats.transcribed += 1;
                info!(
                    index = slice.index,
                    start_ms = slice.start_ms,
                    end_ms = slice.end_ms,
                    "slice transcribed"
                );
            }
            Err(err) => {
                let err = Error::SliceTranscription {
                    index: slice.index,
                    reason: err.to_string(),
                };
                warn!(index = slice.index, error = %err, "slice failed; continuing");
                self.store.mark_failed(slice.index, &err.to_string())?;
                stats.failed += 1;
            }
        }

        Ok(())
    }
}

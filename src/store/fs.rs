//! Filesystem-backed job store.
//!
//! One JSON file per slice under the working directory's `records/` folder.
//! Writes go to a sibling temp file, are fsynced, then renamed into place;
//! the rename is what makes a transition atomic, and the fsync is what makes
//! it durable. Records are re-read from disk on every lookup; there is no
//! in-process cache to fall out of sync with.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{JobRecord, JobStatus, JobStore, TranscriptPayload};
use crate::error::{Error, Result};

pub struct FsJobStore {
    dir: PathBuf,
}

impl FsJobStore {
    /// Open (creating if necessary) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, slice_index: usize) -> PathBuf {
        self.dir.join(format!("record_{slice_index:04}.json"))
    }

    /// Read one record, downgrading corruption to a fresh `Pending` record.
    ///
    /// A record that cannot be parsed, that disagrees about its own index, or
    /// that violates the status/payload invariant is treated as if the slice
    /// had never been processed. The warning keeps the downgrade observable.
    fn read_record(&self, slice_index: usize) -> Result<JobRecord> {
        let path = self.record_path(slice_index);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(JobRecord::pending(slice_index));
            }
            Err(err) => return Err(err.into()),
        };

        match parse_record(&bytes, slice_index) {
            Ok(record) => Ok(record),
            Err(err) => {
                warn!(
                    slice_index,
                    path = %path.display(),
                    error = %err,
                    "treating corrupt job record as pending"
                );
                Ok(JobRecord::pending(slice_index))
            }
        }
    }

    /// Atomically persist one record.
    fn write_record(&self, record: &JobRecord) -> Result<()> {
        let path = self.record_path(record.slice_index);
        let tmp = path.with_extension("json.tmp");

        let mut file = File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, record)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        Ok(())
    }
}

fn parse_record(bytes: &[u8], slice_index: usize) -> Result<JobRecord> {
    let record: JobRecord = serde_json::from_slice(bytes).map_err(|err| Error::StoreCorruption {
        index: slice_index,
        reason: err.to_string(),
    })?;

    if record.slice_index != slice_index {
        return Err(Error::StoreCorruption {
            index: slice_index,
            reason: format!("record claims slice index {}", record.slice_index),
        });
    }
    if !record.is_consistent() {
        return Err(Error::StoreCorruption {
            index: slice_index,
            reason: "status/payload mismatch".into(),
        });
    }

    Ok(record)
}

impl JobStore for FsJobStore {
    fn lookup(&self, slice_index: usize) -> Result<JobRecord> {
        self.read_record(slice_index)
    }

    fn mark_extracted(&self, slice_index: usize) -> Result<()> {
        let mut record = self.read_record(slice_index)?;
        record.status = JobStatus::Extracted;
        record.payload = None;
        record.error = None;
        self.write_record(&record)
    }

    fn mark_transcribed(&self, slice_index: usize, payload: TranscriptPayload) -> Result<()> {
        let mut record = self.read_record(slice_index)?;
        record.status = JobStatus::Transcribed;
        record.payload = Some(payload);
        record.error = None;
        self.write_record(&record)
    }

    fn mark_failed(&self, slice_index: usize, error: &str) -> Result<()> {
        let mut record = self.read_record(slice_index)?;
        record.status = JobStatus::Failed;
        record.payload = None;
        record.error = Some(error.to_owned());
        self.write_record(&record)
    }

    fn all_records(&self) -> Result<Vec<JobRecord>> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(index) = record_index_from_name(&entry.file_name()) {
                indices.push(index);
            }
        }

        indices.sort_unstable();
        indices
            .into_iter()
            .map(|index| self.read_record(index))
            .collect()
    }
}

/// Parse `record_0042.json` → `42`. Temp files and foreign names yield `None`.
fn record_index_from_name(name: &std::ffi::OsStr) -> Option<usize> {
    let name = name.to_str()?;
    let stem = name.strip_prefix("record_")?.strip_suffix(".json")?;
    stem.parse().ok()
}

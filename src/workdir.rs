//! Per-input persistent working directory.
//!
//! Every input media file gets its own directory keyed by the file's identity
//! (absolute path + size + modification time). The directory holds everything a
//! resumed run needs: the normalized waveform, the slice plan, one audio
//! artifact per slice, and one job record per slice. An external inspector or
//! cleanup tool can reason about partial progress from the layout alone.
//!
//! Layout:
//! ```text
//! <work_root>/<key>/
//!   audio.wav               normalized mono 16 kHz waveform
//!   slices.json             cached slice plan
//!   slice_0000.wav          per-slice audio artifacts
//!   records/
//!     record_0000.json      per-slice job records
//! ```
//!
//! Concurrent runs against the same input file are not supported; there is no
//! cross-process lock arbitration.

use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Handle to one input file's working directory.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Resolve (and create) the working directory for `input` under `work_root`.
    ///
    /// A different input file (or the same path after modification) yields an
    /// independent directory, so prior work is never mixed across inputs.
    pub fn for_input(work_root: &Path, input: &Path) -> Result<Self> {
        let key = input_identity(input)?;
        let root = work_root.join(key);
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join("records"))?;
        Ok(Self { root })
    }

    /// Open an existing directory directly. Intended for tests and inspection tools.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join("records"))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Location of the normalized waveform.
    pub fn waveform_path(&self) -> PathBuf {
        self.root.join("audio.wav")
    }

    /// Location of the cached slice plan.
    pub fn slice_plan_path(&self) -> PathBuf {
        self.root.join("slices.json")
    }

    /// Location of one slice's extracted audio.
    pub fn slice_audio_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("slice_{index:04}.wav"))
    }

    /// Directory holding per-slice job records.
    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }
}

/// Hash an input file's identity into a stable directory key.
///
/// We hash the absolute path plus size and mtime rather than file contents so
/// the key is cheap for large media files. Editing the file invalidates the key
/// and prior work is (correctly) not reused.
fn input_identity(input: &Path) -> Result<String> {
    let abs = fs::canonicalize(input)?;
    let meta = fs::metadata(&abs)?;

    let mut hasher = Sha256::new();
    hasher.update(abs.as_os_str().as_encoded_bytes());
    hasher.update(meta.len().to_le_bytes());
    if let Ok(modified) = meta.modified() {
        if let Ok(since_epoch) = modified.duration_since(std::time::UNIX_EPOCH) {
            hasher.update(since_epoch.as_nanos().to_le_bytes());
        }
    }

    let digest = hasher.finalize();
    let mut key = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        key.push_str(&format!("{byte:02x}"));
    }
    Ok(key)
}

/// Serialize `value` as JSON to `path` atomically.
///
/// Writes to a sibling temp file, fsyncs, then renames into place so a crash
/// never leaves a half-written file at `path`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");

    let mut file = File::create(&tmp)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;

    // Persist the rename itself on platforms where directories can be synced.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

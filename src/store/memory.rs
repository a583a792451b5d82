//! In-memory job store for tests and dry runs.
//!
//! Same contract as the filesystem store minus durability: transitions are
//! atomic per slice (guarded by a single mutex) but vanish with the process.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{JobRecord, JobStatus, JobStore, TranscriptPayload};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryJobStore {
    records: Mutex<BTreeMap<usize, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<T>(
        &self,
        slice_index: usize,
        apply: impl FnOnce(&mut JobRecord) -> T,
    ) -> Result<T> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::msg("job store mutex poisoned"))?;
        let record = records
            .entry(slice_index)
            .or_insert_with(|| JobRecord::pending(slice_index));
        Ok(apply(record))
    }
}

impl JobStore for MemoryJobStore {
    fn lookup(&self, slice_index: usize) -> Result<JobRecord> {
        let records = self
            .records
            .lock()
            .map_err(|_| Error::msg("job store mutex poisoned"))?;
        Ok(records
            .get(&slice_index)
            .cloned()
            .unwrap_or_else(|| JobRecord::pending(slice_index)))
    }

    fn mark_extracted(&self, slice_index: usize) -> Result<()> {
        self.with_record(slice_index, |record| {
            record.status = JobStatus::Extracted;
            record.payload = None;
            record.error = None;
        })
    }

    fn mark_transcribed(&self, slice_index: usize, payload: TranscriptPayload) -> Result<()> {
        self.with_record(slice_index, |record| {
            record.status = JobStatus::Transcribed;
            record.payload = Some(payload);
            record.error = None;
        })
    }

    fn mark_failed(&self, slice_index: usize, error: &str) -> Result<()> {
        self.with_record(slice_index, |record| {
            record.status = JobStatus::Failed;
            record.payload = None;
            record.error = Some(error.to_owned());
        })
    }

    fn all_records(&self) -> Result<Vec<JobRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| Error::msg("job store mutex poisoned"))?;
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TranscriptSpan;

    #[test]
    fn lookup_without_writes_is_pending() -> Result<()> {
        let store = MemoryJobStore::new();
        assert_eq!(store.lookup(0)?, JobRecord::pending(0));
        Ok(())
    }

    #[test]
    fn all_records_is_index_ordered() -> Result<()> {
        let store = MemoryJobStore::new();
        store.mark_extracted(9)?;
        store.mark_extracted(2)?;
        store.mark_transcribed(
            5,
            TranscriptPayload {
                spans: vec![TranscriptSpan::new("hi", 0, 100)],
            },
        )?;

        let indices: Vec<usize> = store
            .all_records()?
            .iter()
            .map(|r| r.slice_index)
            .collect();
        assert_eq!(indices, vec![2, 5, 9]);
        Ok(())
    }

    #[test]
    fn failure_clears_any_prior_payload() -> Result<()> {
        let store = MemoryJobStore::new();
        store.mark_transcribed(
            0,
            TranscriptPayload {
                spans: vec![TranscriptSpan::new("first try", 0, 100)],
            },
        )?;
        store.mark_failed(0, "retranscription failed")?;

        let record = store.lookup(0)?;
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.payload.is_none());
        Ok(())
    }
}

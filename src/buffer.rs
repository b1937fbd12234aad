// VecBatch — buffer.rs
// Ordered queue of records waiting to be batched.
// Author: d65v <https://github.com/d65v>
//
// The buffer does no locking. It is owned by a single writer (the engine,
// which takes `&mut self` on every mutating call), so producers are
// serialised by ownership rather than by a mutex.

use std::collections::VecDeque;

use crate::record::Record;

#[derive(Debug, Default)]
pub struct RecordBuffer {
    records: VecDeque<Record>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records to the tail, assigning an id to any record without one.
    pub fn append<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        for mut record in records {
            record.ensure_id();
            self.records.push_back(record);
        }
    }

    /// Remove and return the first `n` records (fewer if the buffer is short).
    pub fn extract(&mut self, n: usize) -> Vec<Record> {
        let n = n.min(self.records.len());
        self.records.drain(..n).collect()
    }

    /// Remove and return everything buffered.
    pub fn extract_all(&mut self) -> Vec<Record> {
        self.records.drain(..).collect()
    }

    /// Hand every full batch of `batch_size` to `submit`, front first.
    ///
    /// Stops at the first error; records of batches not yet extracted stay
    /// buffered.
    pub fn drain_ready<F, E>(&mut self, batch_size: usize, mut submit: F) -> Result<usize, E>
    where
        F: FnMut(Vec<Record>) -> Result<(), E>,
    {
        let batch_size = batch_size.max(1);
        let mut submitted = 0;
        while self.records.len() >= batch_size {
            submit(self.extract(batch_size))?;
            submitted += 1;
        }
        Ok(submitted)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

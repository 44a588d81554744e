//! The record-set buffer: packs records with their per-record completion
//! handles into a framed, optionally compressed byte payload.

use crate::codec::CompressionCodec;
use crate::error::WriteError;
use crate::wire::Coordinate;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

/// The framed-record ceiling. Fixed by the wire framing; callers must not
/// exceed it.
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// The sealed record-set ceiling. Fixed by the wire framing; callers must
/// not exceed it.
pub const MAX_RECORDSET_SIZE: usize = 8 * 1024 * 1024;

type Completion = oneshot::Sender<Result<Coordinate, WriteError>>;

struct Entry {
    payload: Bytes,
    completion: Completion,
}

/// Mutable, append-only container for records awaiting a seal. Owned
/// exclusively by whichever of the writer facade's `cur` slot or a
/// [`PendingWrite`](crate::pending_write::PendingWrite) currently holds it;
/// `seal()` moves it from the former to the latter.
pub struct RecordSetBuffer {
    entries: Vec<Entry>,
    bytes: usize,
    aborted: bool,
}

impl RecordSetBuffer {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            bytes: 0,
            aborted: false,
        }
    }

    /// Cumulative framed byte count, pre-compression. Monotonic while open.
    pub fn num_bytes(&self) -> usize {
        self.bytes
    }

    /// Number of records packed so far. Monotonic while open.
    pub fn num_records(&self) -> usize {
        self.entries.len()
    }

    /// Append a record, returning the receiving half of its one-shot
    /// completion. Fails with `RecordTooLong` without mutating the buffer,
    /// or with `Framing` -- in which case the buffer aborts every record
    /// already packed in it and refuses further appends.
    pub fn append(
        &mut self,
        payload: Bytes,
    ) -> Result<oneshot::Receiver<Result<Coordinate, WriteError>>, WriteError> {
        if self.aborted {
            return Err(WriteError::Framing("buffer already aborted".to_string()));
        }

        if payload.len() > MAX_RECORD_SIZE {
            return Err(WriteError::RecordTooLong {
                len: payload.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let framed_len = payload.len() + 4;
        let new_total = match self.bytes.checked_add(framed_len) {
            Some(total) => total,
            None => {
                let cause = WriteError::Framing("record-set byte count overflow".to_string());
                self.abort(cause.clone());
                return Err(cause);
            }
        };

        let (tx, rx) = oneshot::channel();
        self.entries.push(Entry {
            payload,
            completion: tx,
        });
        self.bytes = new_total;
        Ok(rx)
    }

    /// Resolve every pending completion as failed with `cause`. Also the
    /// terminal state entered internally after a framing failure.
    pub fn abort(&mut self, cause: WriteError) {
        self.aborted = true;
        self.bytes = 0;
        for entry in self.entries.drain(..) {
            let _ = entry.completion.send(Err(cause.clone()));
        }
    }

    /// Frame and (optionally) compress the buffered records, sealing the
    /// buffer into its append-immutable, dispatch-ready form. Slot `i`
    /// within the set is derived from the acknowledgement's base coordinate
    /// at `complete_transmit` time, not here.
    pub fn seal(self, codec: CompressionCodec) -> SealedRecordSet {
        let mut framed = Vec::with_capacity(self.bytes);
        let mut completions = Vec::with_capacity(self.entries.len());

        for entry in self.entries {
            framed.extend_from_slice(&(entry.payload.len() as u32).to_be_bytes());
            framed.extend_from_slice(&entry.payload);
            completions.push(entry.completion);
        }

        let record_count = completions.len() as u32;
        let payload = codec.compress(&framed);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            records = record_count,
            bytes = payload.len(),
            ?codec,
            "record set sealed"
        );

        SealedRecordSet {
            payload,
            record_count,
            completions: Mutex::new(Some(completions)),
            terminal: AtomicBool::new(false),
        }
    }
}

impl Default for RecordSetBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// An append-immutable, framed record set handed off to a
/// [`PendingWrite`](crate::pending_write::PendingWrite). `complete_transmit`
/// and `abort_transmit` are mutually exclusive: the first call to either
/// wins, and the other becomes a no-op.
pub struct SealedRecordSet {
    payload: Bytes,
    record_count: u32,
    completions: Mutex<Option<Vec<Completion>>>,
    terminal: AtomicBool,
}

impl SealedRecordSet {
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Resolve every completion handle, in append order, with a coordinate
    /// derived from `base` by adding the record's index within the set.
    pub fn complete_transmit(&self, base: Coordinate) {
        if self.terminal.swap(true, Ordering::AcqRel) {
            return;
        }
        let completions = self.completions.lock().take();
        if let Some(completions) = completions {
            for (i, tx) in completions.into_iter().enumerate() {
                let coordinate = base.offset_by(i as u32);
                let _ = tx.send(Ok(coordinate));
            }
        }
    }

    /// Resolve every completion handle as failed with `cause`.
    pub fn abort_transmit(&self, cause: WriteError) {
        if self.terminal.swap(true, Ordering::AcqRel) {
            return;
        }
        let completions = self.completions.lock().take();
        if let Some(completions) = completions {
            for tx in completions {
                let _ = tx.send(Err(cause.clone()));
            }
        }
    }
}

//! The writer facade: the public entry point. Admits single records,
//! decides when to seal and hand off a buffer, and owns the periodic flush
//! tick.

use crate::clock::{Clock, SystemClock};
use crate::codec::CompressionCodec;
use crate::error::{ConfigError, WriteError};
use crate::pending_write::PendingWrite;
use crate::record_set::{RecordSetBuffer, SealedRecordSet, MAX_RECORDSET_SIZE, MAX_RECORD_SIZE};
use crate::roster::Roster;
use crate::speculative::{self, SpeculativePolicy};
use crate::wire::{Coordinate, WireClient};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_micros(2000);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_FIRST_SPECULATIVE_TIMEOUT: Duration = Duration::from_millis(50);
const DEFAULT_MAX_SPECULATIVE_TIMEOUT: Duration = Duration::from_millis(200);
const DEFAULT_SPECULATIVE_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Where background tasks (the periodic flush tick) are spawned. An injected
/// scheduler is never shut down by `close()`; an owned one is.
#[derive(Clone)]
enum Scheduler {
    Owned,
    Injected(Handle),
}

impl Scheduler {
    fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match self {
            Scheduler::Owned => tokio::spawn(fut),
            Scheduler::Injected(handle) => handle.spawn(fut),
        }
    }

    fn is_owned(&self) -> bool {
        matches!(self, Scheduler::Owned)
    }
}

/// Immutable, validated configuration snapshot produced by
/// [`WriterBuilder::build`].
struct WriterConfig {
    buffer_size: usize,
    flush_interval: Duration,
    codec: CompressionCodec,
    request_timeout: Duration,
    speculative_policy: SpeculativePolicy,
}

struct WriterState {
    cur: RecordSetBuffer,
    closed: bool,
}

/// Builder for configuring a [`Writer`].
///
/// Mirrors the teacher's two-stage `ClientBuilder`/`ProducerBuilder`
/// pattern: collect options on an owned builder, then validate and assemble
/// everything on `.build()`.
#[must_use = "builders do nothing unless you call .build()"]
pub struct WriterBuilder {
    streams: Vec<String>,
    buffer_size: usize,
    flush_interval: Duration,
    codec: CompressionCodec,
    request_timeout: Duration,
    first_speculative_timeout: Duration,
    max_speculative_timeout: Duration,
    speculative_backoff_multiplier: f64,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Handle>,
    wire_client: Option<Arc<dyn WireClient>>,
}

impl WriterBuilder {
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            codec: CompressionCodec::None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            first_speculative_timeout: DEFAULT_FIRST_SPECULATIVE_TIMEOUT,
            max_speculative_timeout: DEFAULT_MAX_SPECULATIVE_TIMEOUT,
            speculative_backoff_multiplier: DEFAULT_SPECULATIVE_BACKOFF_MULTIPLIER,
            clock: None,
            scheduler: None,
            wire_client: None,
        }
    }

    /// Required: the dispatch roster, shuffled once at build time.
    pub fn streams(mut self, streams: Vec<String>) -> Self {
        self.streams = streams;
        self
    }

    /// Required: the collaborator used to physically submit record sets.
    pub fn wire_client(mut self, wire_client: Arc<dyn WireClient>) -> Self {
        self.wire_client = Some(wire_client);
        self
    }

    /// Seal-and-flush threshold in payload bytes. Default 16 KiB, capped at
    /// `MAX_RECORDSET_SIZE`.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Periodic flush tick; `Duration::ZERO` disables it. Default 2000 µs.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Codec for sealed sets. Default `None`.
    pub fn compression_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Hard per-set deadline. Default 500 ms.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Initial speculative tick. Default 50 ms.
    pub fn first_speculative_timeout(mut self, timeout: Duration) -> Self {
        self.first_speculative_timeout = timeout;
        self
    }

    /// Ceiling on the speculative tick. Default 200 ms.
    pub fn max_speculative_timeout(mut self, timeout: Duration) -> Self {
        self.max_speculative_timeout = timeout;
        self
    }

    /// Tick multiplier. Default 2.0.
    pub fn speculative_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.speculative_backoff_multiplier = multiplier;
        self
    }

    /// Injectable monotonic clock for the dispatch deadline. Defaults to
    /// [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Injectable scheduler for the periodic flush tick. If absent, the
    /// writer spawns on the ambient runtime and owns the resulting task,
    /// aborting it on `close()`.
    pub fn scheduler(mut self, handle: Handle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    /// Validate and assemble the writer.
    pub fn build(self) -> Result<Writer, ConfigError> {
        if self.streams.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.buffer_size > MAX_RECORDSET_SIZE {
            return Err(ConfigError::BufferSizeExceedsMax {
                buffer_size: self.buffer_size,
                max: MAX_RECORDSET_SIZE,
            });
        }

        let policy = SpeculativePolicy {
            first: self.first_speculative_timeout,
            max: self.max_speculative_timeout,
            multiplier: self.speculative_backoff_multiplier,
        };
        policy.validate(self.request_timeout)?;

        let wire_client = self.wire_client.ok_or(ConfigError::MissingWireClient)?;

        let config = Arc::new(WriterConfig {
            buffer_size: self.buffer_size,
            flush_interval: self.flush_interval,
            codec: self.codec,
            request_timeout: self.request_timeout,
            speculative_policy: policy,
        });

        let scheduler = match self.scheduler {
            Some(handle) => Scheduler::Injected(handle),
            None => Scheduler::Owned,
        };

        let writer = Writer {
            state: Arc::new(Mutex::new(WriterState {
                cur: RecordSetBuffer::new(),
                closed: false,
            })),
            config,
            roster: Arc::new(Roster::new(self.streams)),
            wire: wire_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            scheduler,
            flush_task: Arc::new(Mutex::new(None)),
        };

        if !writer.config.flush_interval.is_zero() {
            writer.spawn_flush_task();
        }

        Ok(writer)
    }
}

impl Default for WriterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The writer facade.
///
/// Cloneable and cheap to share: every field is an `Arc` (or an `Arc`-backed
/// handle), following the teacher's `Producer` shape.
#[derive(Clone)]
pub struct Writer {
    state: Arc<Mutex<WriterState>>,
    config: Arc<WriterConfig>,
    roster: Arc<Roster>,
    wire: Arc<dyn WireClient>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    flush_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Writer {
    pub fn builder() -> WriterBuilder {
        WriterBuilder::new()
    }

    /// Admit a single record. Returns once the record has been durably
    /// acknowledged (by whichever stream answers first) or has failed.
    pub async fn write(&self, payload: impl Into<Bytes>) -> Result<Coordinate, WriteError> {
        let payload = payload.into();

        if payload.len() > MAX_RECORD_SIZE {
            return Err(WriteError::RecordTooLong {
                len: payload.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let rx = {
            let mut state = self.state.lock();

            if state.closed {
                return Err(WriteError::Closed);
            }

            if state.cur.num_bytes() + payload.len() > MAX_RECORDSET_SIZE {
                self.seal_and_dispatch_locked(&mut state);
            }

            let rx = match state.cur.append(payload) {
                Ok(rx) => rx,
                Err(err @ WriteError::Framing(_)) => {
                    state.cur = RecordSetBuffer::new();
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

            if state.cur.num_bytes() >= self.config.buffer_size {
                self.seal_and_dispatch_locked(&mut state);
            }

            rx
        };

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(WriteError::Closed),
        }
    }

    /// Flush the currently-open buffer, if non-empty, and dispatch it.
    pub async fn flush(&self) {
        let sealed = {
            let mut state = self.state.lock();
            if state.cur.num_records() == 0 {
                return;
            }
            let sealed_buf = std::mem::take(&mut state.cur).seal(self.config.codec);
            sealed_buf
        };

        self.dispatch(sealed);
    }

    /// Close the writer. Performs a final flush of the currently-open
    /// buffer (so no admitted record is silently dropped), but does not
    /// abort already-dispatched, in-flight sets -- those continue to race
    /// under their own deadline, independent of the facade's lifetime.
    /// Subsequent `write()` calls are rejected with `WriteError::Closed`.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        self.flush().await;

        if self.scheduler.is_owned() {
            if let Some(handle) = self.flush_task.lock().take() {
                handle.abort();
            }
        }
    }

    fn seal_and_dispatch_locked(&self, state: &mut WriterState) {
        if state.cur.num_records() == 0 {
            return;
        }
        let sealed = std::mem::take(&mut state.cur).seal(self.config.codec);
        self.dispatch(sealed);
    }

    fn dispatch(&self, sealed: SealedRecordSet) {
        let pending = PendingWrite::new(
            sealed,
            Arc::clone(&self.roster),
            Arc::clone(&self.wire),
            Arc::clone(&self.clock),
            self.config.request_timeout,
        );
        pending.send_next_attempt();
        speculative::spawn_ladder(pending, self.config.speculative_policy);
    }

    fn spawn_flush_task(&self) {
        let writer = self.clone();
        let interval = self.config.flush_interval;
        let handle = self.scheduler.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the very first
            // flush respects the configured interval.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                {
                    let closed = writer.state.lock().closed;
                    if closed {
                        return;
                    }
                }
                writer.flush().await;
            }
        });
        *self.flush_task.lock() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct RecordingWire {
        calls: StdMutex<Vec<String>>,
        ack: Coordinate,
    }

    impl RecordingWire {
        fn new(ack: Coordinate) -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                ack,
            })
        }
    }

    #[async_trait]
    impl WireClient for RecordingWire {
        async fn write_record_set(
            &self,
            stream: &str,
            _payload: Bytes,
            _record_count: u32,
        ) -> Result<Coordinate, WireError> {
            self.calls.lock().unwrap().push(stream.to_string());
            Ok(self.ack)
        }
    }

    fn builder_with_wire(wire: Arc<dyn WireClient>) -> WriterBuilder {
        Writer::builder()
            .streams(vec!["A".into(), "B".into(), "C".into()])
            .wire_client(wire)
            .flush_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn record_too_long_rejected_without_touching_buffer() {
        let wire = RecordingWire::new(Coordinate::new(0, 0, 0));
        let writer = builder_with_wire(wire).build().unwrap();

        let oversized = vec![0u8; MAX_RECORD_SIZE + 1];
        let err = writer.write(oversized).await.unwrap_err();
        assert!(matches!(err, WriteError::RecordTooLong { .. }));
    }

    #[tokio::test]
    async fn size_triggered_seal_dispatches_only_full_set() {
        // S5: bufferSize sized for exactly two 4-byte records (8-byte framed
        // each), flush disabled.
        let wire = RecordingWire::new(Coordinate::new(1, 1, 0));
        let writer = builder_with_wire(wire.clone())
            .buffer_size(16)
            .build()
            .unwrap();

        let r1 = writer.write(Bytes::from_static(b"aaaa"));
        let r2 = writer.write(Bytes::from_static(b"bbbb"));
        let (c1, c2) = tokio::join!(r1, r2);
        assert_eq!(c1.unwrap(), Coordinate::new(1, 1, 0));
        assert_eq!(c2.unwrap(), Coordinate::new(1, 1, 1));

        // A third, smaller write lands in a fresh buffer and is not
        // dispatched until the next seal/flush.
        assert_eq!(wire.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flush_seals_and_dispatches_open_buffer() {
        let wire = RecordingWire::new(Coordinate::new(7, 42, 0));
        let writer = builder_with_wire(wire.clone()).build().unwrap();

        let r1 = writer.write(Bytes::from_static(b"hello"));
        let r2 = writer.write(Bytes::from_static(b"world"));
        let r3 = writer.write(Bytes::from_static(b"!!"));

        // Give the writes a chance to land in the buffer before flushing.
        tokio::task::yield_now().await;
        writer.flush().await;

        let (c1, c2, c3) = tokio::join!(r1, r2, r3);
        assert_eq!(c1.unwrap(), Coordinate::new(7, 42, 0));
        assert_eq!(c2.unwrap(), Coordinate::new(7, 42, 1));
        assert_eq!(c3.unwrap(), Coordinate::new(7, 42, 2));
    }

    #[tokio::test]
    async fn close_rejects_subsequent_writes() {
        let wire = RecordingWire::new(Coordinate::new(0, 0, 0));
        let writer = builder_with_wire(wire).build().unwrap();
        writer.close().await;

        let err = writer.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, WriteError::Closed));
    }

    #[tokio::test]
    async fn close_flushes_the_open_buffer() {
        let wire = RecordingWire::new(Coordinate::new(4, 4, 0));
        let writer = builder_with_wire(wire.clone()).build().unwrap();

        let r1 = writer.write(Bytes::from_static(b"x"));
        writer.close().await;

        let c1 = r1.await.unwrap();
        assert_eq!(c1, Coordinate::new(4, 4, 0));
    }

    #[test]
    fn build_rejects_empty_roster() {
        let wire = RecordingWire::new(Coordinate::new(0, 0, 0));
        let err = Writer::builder().wire_client(wire).build().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRoster));
    }

    #[test]
    fn build_rejects_missing_wire_client() {
        let err = Writer::builder()
            .streams(vec!["A".into()])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingWireClient));
    }

    #[test]
    fn build_rejects_oversized_buffer() {
        let wire = RecordingWire::new(Coordinate::new(0, 0, 0));
        let err = Writer::builder()
            .streams(vec!["A".into()])
            .wire_client(wire)
            .buffer_size(MAX_RECORDSET_SIZE + 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BufferSizeExceedsMax { .. }));
    }
}

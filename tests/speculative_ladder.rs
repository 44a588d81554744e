//! Exercises the speculative ladder through the real `tokio::time` timers
//! (via `Writer`/`spawn_ladder`), rather than by calling `PendingWrite`
//! methods by hand. Time is paused and advanced deterministically so the
//! tick schedule can be asserted exactly, mirroring scenarios S2/S6.

use async_trait::async_trait;
use bytes::Bytes;
use multistream_writer::{Coordinate, WireClient, WireError, Writer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A wire client whose first `hang_until_call` invocations never resolve;
/// every call after that succeeds immediately with `ack`.
struct HangThenSucceed {
    calls: AtomicUsize,
    hang_until_call: usize,
    ack: Coordinate,
}

#[async_trait]
impl WireClient for HangThenSucceed {
    async fn write_record_set(
        &self,
        _stream: &str,
        _payload: Bytes,
        _record_count: u32,
    ) -> Result<Coordinate, WireError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.hang_until_call {
            std::future::pending::<()>().await;
            unreachable!("hung attempts are never polled to completion");
        }
        Ok(self.ack)
    }
}

#[tokio::test(start_paused = true)]
async fn ladder_issues_second_and_third_attempts_on_the_exponential_schedule() {
    // S6-style ladder: first=10ms, max=40ms, x3 -> tick intervals are
    // 10ms, then min(10*3, 40)=30ms, then capped at 40ms thereafter.
    let wire = Arc::new(HangThenSucceed {
        calls: AtomicUsize::new(0),
        hang_until_call: 2,
        ack: Coordinate::new(7, 42, 0),
    });

    let writer = Writer::builder()
        .streams(vec!["A".into(), "B".into(), "C".into()])
        .wire_client(wire.clone())
        .flush_interval(Duration::ZERO)
        .request_timeout(Duration::from_millis(500))
        .first_speculative_timeout(Duration::from_millis(10))
        .max_speculative_timeout(Duration::from_millis(40))
        .speculative_backoff_multiplier(3.0)
        .build()
        .unwrap();

    // Run the `write()` call on its own task so it can make progress
    // (land the record in the buffer, then block on its completion
    // handle) concurrently with the time-advancing below.
    let write_task = {
        let writer = writer.clone();
        tokio::spawn(async move { writer.write(Bytes::from_static(b"x")).await })
    };

    // Let the spawned write land in the buffer, then seal+dispatch it:
    // this issues attempt #1 synchronously and arms the speculative
    // ladder.
    tokio::task::yield_now().await;
    writer.flush().await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(wire.calls.load(Ordering::SeqCst), 1, "attempt #1 issued");

    // Nothing more happens before the first tick at t=10ms.
    tokio::time::advance(Duration::from_millis(9)).await;
    tokio::task::yield_now().await;
    assert_eq!(wire.calls.load(Ordering::SeqCst), 1, "no tick before t=10ms");

    // At t=10ms the ladder issues attempt #2 (also hangs).
    tokio::time::advance(Duration::from_millis(1)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(wire.calls.load(Ordering::SeqCst), 2, "attempt #2 issued at t=10ms");

    // The interval multiplies by 3, capped at max=40ms: next tick is at
    // t=10+30=40ms, not before.
    tokio::time::advance(Duration::from_millis(29)).await;
    tokio::task::yield_now().await;
    assert_eq!(wire.calls.load(Ordering::SeqCst), 2, "no tick before t=40ms");

    // At t=40ms attempt #3 is issued and succeeds, settling the set.
    tokio::time::advance(Duration::from_millis(1)).await;
    let coordinate = write_task.await.unwrap().unwrap();
    assert_eq!(coordinate, Coordinate::new(7, 42, 0));
    assert_eq!(wire.calls.load(Ordering::SeqCst), 3, "attempt #3 settles the set");
}

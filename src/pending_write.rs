//! The dispatch state machine: tracks one sealed record set's life across
//! speculative attempts on the roster, enforces the hard deadline, and
//! settles the set on first success or gives up.

use crate::clock::Clock;
use crate::error::WriteError;
use crate::record_set::SealedRecordSet;
use crate::roster::Roster;
use crate::wire::{Coordinate, WireClient};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct DispatchState {
    next_stream_idx: usize,
    tried_count: usize,
}

/// One record set's dispatch across the roster. `Open` until the first
/// transition to `Settled/Success` or `Settled/Failure`; terminal states
/// are absorbing (`settled` is a one-shot CAS flag).
pub struct PendingWrite {
    sealed: SealedRecordSet,
    roster: Arc<Roster>,
    wire: Arc<dyn WireClient>,
    clock: Arc<dyn Clock>,
    started_at: Instant,
    deadline: Duration,
    dispatch: Mutex<DispatchState>,
    settled: AtomicBool,
}

impl PendingWrite {
    pub fn new(
        sealed: SealedRecordSet,
        roster: Arc<Roster>,
        wire: Arc<dyn WireClient>,
        clock: Arc<dyn Clock>,
        deadline: Duration,
    ) -> Arc<Self> {
        let start_index = roster.next_start_index();
        let started_at = clock.now();
        Arc::new(Self {
            sealed,
            roster,
            wire,
            clock,
            started_at,
            deadline,
            dispatch: Mutex::new(DispatchState {
                next_stream_idx: start_index,
                tried_count: 0,
            }),
            settled: AtomicBool::new(false),
        })
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Issue the next speculative attempt, or settle the set as failed if
    /// the roster is exhausted or the hard deadline has elapsed. Returns the
    /// stream name an attempt was issued against, or `None` if no further
    /// attempt was issued.
    pub fn send_next_attempt(self: &Arc<Self>) -> Option<String> {
        if self.is_settled() {
            return None;
        }

        let stream_name = {
            let mut dispatch = self.dispatch.lock();
            let elapsed = self.clock.now().saturating_duration_since(self.started_at);

            if elapsed > self.deadline || dispatch.tried_count >= self.roster.len() {
                let tried = dispatch.tried_count;
                drop(dispatch);
                self.settle_failure(elapsed, tried);
                return None;
            }

            let stream_id = dispatch.next_stream_idx;
            dispatch.next_stream_idx = (dispatch.next_stream_idx + 1) % self.roster.len();
            dispatch.tried_count += 1;
            #[cfg(feature = "tracing")]
            tracing::debug!(
                stream = %self.roster.get(stream_id),
                attempt = dispatch.tried_count,
                age_ms = elapsed.as_millis(),
                "issuing write attempt"
            );
            self.roster.get(stream_id).to_string()
        };

        let this = Arc::clone(self);
        let attempt_stream = stream_name.clone();
        tokio::spawn(async move {
            let payload = this.sealed.payload();
            let record_count = this.sealed.record_count();
            match this
                .wire
                .write_record_set(&attempt_stream, payload, record_count)
                .await
            {
                Ok(coordinate) => this.on_success(coordinate),
                Err(_cause) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(stream = %attempt_stream, cause = %_cause, "attempt failed, speculating another");
                    this.on_failure();
                }
            }
        });

        Some(stream_name)
    }

    fn settle_failure(&self, elapsed: Duration, tried: usize) {
        if self.settled.swap(true, Ordering::AcqRel) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(?elapsed, tried, roster_size = self.roster.len(), "record set timed out");
        self.sealed.abort_transmit(WriteError::SetDeadline {
            elapsed,
            tried,
            roster_size: self.roster.len(),
        });
    }

    /// First attempt to win the settlement CAS names the per-record
    /// coordinates; later successes are discarded.
    fn on_success(&self, coordinate: Coordinate) {
        if self.settled.swap(true, Ordering::AcqRel) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(?coordinate, "record set acknowledged");
        self.sealed.complete_transmit(coordinate);
    }

    /// A single attempt's failure is never user-visible: immediately
    /// speculate another attempt, recovering transparently up to the
    /// roster/deadline limits.
    fn on_failure(self: &Arc<Self>) {
        self.send_next_attempt();
    }

    /// Entry point for the speculative policy's timer ladder. Returns
    /// `true` only if an attempt was actually issued and the set is still
    /// open -- this is what tells the policy to schedule the next tick.
    pub fn issue_speculative(self: &Arc<Self>) -> bool {
        if self.is_settled() {
            return false;
        }
        let issued = self.send_next_attempt();
        issued.is_some() && !self.is_settled()
    }
}

//! The exponential-backoff speculative tick ladder: periodically asks a
//! [`PendingWrite`] to issue an additional parallel attempt.

use crate::error::ConfigError;
use crate::pending_write::PendingWrite;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Timing parameters for the speculative ladder.
#[derive(Clone, Copy, Debug)]
pub struct SpeculativePolicy {
    pub first: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl SpeculativePolicy {
    /// `0 < first <= max < request_timeout` and `multiplier > 0`.
    pub fn validate(&self, request_timeout: Duration) -> Result<(), ConfigError> {
        if self.first.is_zero() {
            return Err(ConfigError::FirstTimeoutNotPositive(self.first));
        }
        if self.first > self.max {
            return Err(ConfigError::FirstExceedsMax {
                first: self.first,
                max: self.max,
            });
        }
        if self.max >= request_timeout {
            return Err(ConfigError::MaxExceedsRequestTimeout {
                max: self.max,
                request: request_timeout,
            });
        }
        if self.multiplier <= 0.0 {
            return Err(ConfigError::MultiplierNotPositive(self.multiplier));
        }
        Ok(())
    }

    fn next_tick(&self, current: Duration) -> Duration {
        let multiplied = current.as_secs_f64() * self.multiplier;
        Duration::from_secs_f64(multiplied.min(self.max.as_secs_f64()))
    }
}

/// Drive `pending`'s speculative ladder on the runtime's own timers, stopping
/// as soon as `issue_speculative` reports the set can no longer be advanced
/// (settled, or the roster/deadline is exhausted).
pub fn spawn_ladder(pending: Arc<PendingWrite>, policy: SpeculativePolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = policy.first;
        loop {
            tokio::time::sleep(tick).await;
            if !pending.issue_speculative() {
                return;
            }
            tick = policy.next_tick(tick);
        }
    })
}

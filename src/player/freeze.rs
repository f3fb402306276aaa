//! Cancellable freeze countdown.

use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

/// How a freeze wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeOutcome {
    /// The full freeze elapsed.
    Elapsed,
    /// Termination interrupted the wait.
    Cancelled,
}

/// A deadline that reports its remaining time at a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct FreezeTimer {
    deadline: Instant,
    tick: Duration,
}

impl FreezeTimer {
    /// Starts a freeze of `duration` now, refreshed every `tick`.
    pub fn start(duration: Duration, tick: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    /// The instant at which the freeze ends.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the freeze ends.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Waits for the deadline, calling `on_tick` with the remaining time after
    /// every tick that does not end the freeze.
    #[instrument(skip(self, cancel, on_tick))]
    pub async fn wait(
        &self,
        cancel: &CancellationToken,
        mut on_tick: impl FnMut(Duration),
    ) -> FreezeOutcome {
        loop {
            let now = Instant::now();
            if now >= self.deadline {
                return FreezeOutcome::Elapsed;
            }
            let wake = self.deadline.min(now + self.tick);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    trace!("Freeze interrupted");
                    return FreezeOutcome::Cancelled;
                }
                _ = sleep_until(wake) => {}
            }
            let remaining = self.remaining();
            if !remaining.is_zero() {
                on_tick(remaining);
            }
        }
    }
}
